//! SQLite store for teams, players, fixtures, weekly stats and predictions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

use crate::actual_lineup::RealizedCandidate;
use crate::lineup::ProjectedCandidate;
use crate::predictor::Prediction;
use crate::records::{
    DEFAULT_DIFFICULTY, LeagueSnapshot, PlayerInfo, Position, ScheduledFixture, StatRecord, Team,
};

const CACHE_DIR: &str = "fpl_lineup";
const DB_FILE: &str = "fpl.sqlite";

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            short_name TEXT NULL,
            strength_attack REAL NOT NULL DEFAULT 50,
            strength_defense REAL NOT NULL DEFAULT 50
        );

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            team_id INTEGER NOT NULL REFERENCES teams(id),
            position TEXT NOT NULL CHECK (position IN ('GK', 'DEF', 'MID', 'FWD')),
            price REAL NOT NULL DEFAULT 5.0,
            status TEXT NOT NULL DEFAULT 'fit',
            chance_playing_next INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            gw INTEGER NOT NULL,
            home_team_id INTEGER NOT NULL REFERENCES teams(id),
            away_team_id INTEGER NOT NULL REFERENCES teams(id),
            home_difficulty INTEGER NULL,
            away_difficulty INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_gw ON matches(gw);

        CREATE TABLE IF NOT EXISTS player_gameweek_stats (
            gw INTEGER NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            team_id INTEGER NOT NULL,
            opponent_team_id INTEGER NULL,
            was_home INTEGER NOT NULL DEFAULT 0,
            difficulty INTEGER NULL,
            started INTEGER NOT NULL DEFAULT 0,
            minutes INTEGER NOT NULL DEFAULT 0,
            total_points INTEGER NOT NULL DEFAULT 0,
            goals INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            clean_sheet INTEGER NOT NULL DEFAULT 0,
            saves INTEGER NOT NULL DEFAULT 0,
            yellow INTEGER NOT NULL DEFAULT 0,
            red INTEGER NOT NULL DEFAULT 0,
            bonus INTEGER NOT NULL DEFAULT 0,
            bps INTEGER NOT NULL DEFAULT 0,
            influence REAL NOT NULL DEFAULT 0,
            creativity REAL NOT NULL DEFAULT 0,
            threat REAL NOT NULL DEFAULT 0,
            ict_index REAL NOT NULL DEFAULT 0,
            xg REAL NOT NULL DEFAULT 0,
            xa REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (gw, player_id)
        );

        CREATE TABLE IF NOT EXISTS predictions (
            gw INTEGER NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            p_start REAL NOT NULL,
            expected_points REAL NOT NULL,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (gw, player_id)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_teams(conn: &mut Connection, teams: &[Team]) -> Result<usize> {
    let tx = conn.transaction().context("begin teams transaction")?;
    for t in teams {
        tx.execute(
            r#"
            INSERT INTO teams (id, name, short_name, strength_attack, strength_defense)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                short_name = excluded.short_name,
                strength_attack = excluded.strength_attack,
                strength_defense = excluded.strength_defense
            "#,
            params![
                t.id as i64,
                t.name,
                t.short_name,
                t.strength_attack,
                t.strength_defense
            ],
        )
        .context("upsert team")?;
    }
    tx.commit().context("commit teams transaction")?;
    Ok(teams.len())
}

pub fn upsert_players(conn: &mut Connection, players: &[PlayerInfo]) -> Result<usize> {
    let tx = conn.transaction().context("begin players transaction")?;
    for p in players {
        tx.execute(
            r#"
            INSERT INTO players (id, name, team_id, position, price, status, chance_playing_next)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                team_id = excluded.team_id,
                position = excluded.position,
                price = excluded.price,
                status = excluded.status,
                chance_playing_next = excluded.chance_playing_next
            "#,
            params![
                p.id as i64,
                p.name,
                p.team_id as i64,
                p.position.code(),
                p.price,
                p.status,
                p.chance_playing_next.map(i64::from),
            ],
        )
        .context("upsert player")?;
    }
    tx.commit().context("commit players transaction")?;
    Ok(players.len())
}

pub fn upsert_fixtures(conn: &mut Connection, fixtures: &[ScheduledFixture]) -> Result<usize> {
    let tx = conn.transaction().context("begin fixtures transaction")?;
    for f in fixtures {
        tx.execute(
            r#"
            INSERT INTO matches (id, gw, home_team_id, away_team_id, home_difficulty, away_difficulty)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                gw = excluded.gw,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                home_difficulty = excluded.home_difficulty,
                away_difficulty = excluded.away_difficulty
            "#,
            params![
                f.id as i64,
                f.week as i64,
                f.home_team_id as i64,
                f.away_team_id as i64,
                f.home_difficulty.map(i64::from),
                f.away_difficulty.map(i64::from),
            ],
        )
        .context("upsert fixture")?;
    }
    tx.commit().context("commit fixtures transaction")?;
    Ok(fixtures.len())
}

pub fn upsert_stat_records(conn: &mut Connection, records: &[StatRecord]) -> Result<usize> {
    let tx = conn.transaction().context("begin stats transaction")?;
    for r in records {
        upsert_stat_record(&tx, r)?;
    }
    tx.commit().context("commit stats transaction")?;
    debug!("upserted {} stat records", records.len());
    Ok(records.len())
}

fn upsert_stat_record(tx: &Transaction<'_>, r: &StatRecord) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO player_gameweek_stats (
            gw, player_id, team_id, opponent_team_id, was_home, difficulty,
            started, minutes, total_points, goals, assists, clean_sheet,
            saves, yellow, red, bonus, bps,
            influence, creativity, threat, ict_index, xg, xa
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22, ?23
        )
        ON CONFLICT(gw, player_id) DO UPDATE SET
            team_id = excluded.team_id,
            opponent_team_id = excluded.opponent_team_id,
            was_home = excluded.was_home,
            difficulty = excluded.difficulty,
            started = excluded.started,
            minutes = excluded.minutes,
            total_points = excluded.total_points,
            goals = excluded.goals,
            assists = excluded.assists,
            clean_sheet = excluded.clean_sheet,
            saves = excluded.saves,
            yellow = excluded.yellow,
            red = excluded.red,
            bonus = excluded.bonus,
            bps = excluded.bps,
            influence = excluded.influence,
            creativity = excluded.creativity,
            threat = excluded.threat,
            ict_index = excluded.ict_index,
            xg = excluded.xg,
            xa = excluded.xa
        "#,
        params![
            r.week as i64,
            r.player_id as i64,
            r.team_id as i64,
            r.opponent_team_id.map(i64::from),
            bool_to_i64(r.was_home),
            r.difficulty as i64,
            bool_to_i64(r.started),
            r.minutes as i64,
            r.total_points as i64,
            r.goals as i64,
            r.assists as i64,
            r.clean_sheet as i64,
            r.saves as i64,
            r.yellow as i64,
            r.red as i64,
            r.bonus as i64,
            r.bps as i64,
            r.influence,
            r.creativity,
            r.threat,
            r.ict_index,
            r.xg,
            r.xa,
        ],
    )
    .context("upsert stat record")?;
    Ok(())
}

/// Stat records with `from <= gw <= to`, ordered by (gw, player).
pub fn load_stat_records(conn: &Connection, from: u32, to: u32) -> Result<Vec<StatRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                gw, player_id, team_id, opponent_team_id, was_home, difficulty,
                started, minutes, total_points, goals, assists, clean_sheet,
                saves, yellow, red, bonus, bps,
                influence, creativity, threat, ict_index, xg, xa
            FROM player_gameweek_stats
            WHERE gw BETWEEN ?1 AND ?2
            ORDER BY gw ASC, player_id ASC
            "#,
        )
        .context("prepare load stats query")?;

    let rows = stmt
        .query_map(params![from as i64, to as i64], stat_record_from_row)
        .context("query load stats")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode stat row")?);
    }
    Ok(out)
}

fn stat_record_from_row(row: &Row<'_>) -> rusqlite::Result<StatRecord> {
    Ok(StatRecord {
        week: row.get(0)?,
        player_id: row.get(1)?,
        team_id: row.get(2)?,
        opponent_team_id: row.get(3)?,
        was_home: row.get::<_, i64>(4)? != 0,
        difficulty: row
            .get::<_, Option<u8>>(5)?
            .unwrap_or(DEFAULT_DIFFICULTY),
        started: row.get::<_, i64>(6)? != 0,
        minutes: row.get(7)?,
        total_points: row.get(8)?,
        goals: row.get(9)?,
        assists: row.get(10)?,
        clean_sheet: row.get(11)?,
        saves: row.get(12)?,
        yellow: row.get(13)?,
        red: row.get(14)?,
        bonus: row.get(15)?,
        bps: row.get(16)?,
        influence: row.get(17)?,
        creativity: row.get(18)?,
        threat: row.get(19)?,
        ict_index: row.get(20)?,
        xg: row.get(21)?,
        xa: row.get(22)?,
    })
}

pub fn load_league_snapshot(conn: &Connection) -> Result<LeagueSnapshot> {
    let mut stmt = conn
        .prepare("SELECT id, name, short_name, strength_attack, strength_defense FROM teams ORDER BY id")
        .context("prepare load teams query")?;
    let teams = stmt
        .query_map([], |row| {
            Ok(Team {
                id: row.get(0)?,
                name: row.get(1)?,
                short_name: row.get(2)?,
                strength_attack: row.get(3)?,
                strength_defense: row.get(4)?,
            })
        })
        .context("query load teams")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode team row")?;

    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, name, team_id, position, price, status, chance_playing_next
            FROM players
            ORDER BY id
            "#,
        )
        .context("prepare load players query")?;
    let raw_players = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<u8>>(6)?,
            ))
        })
        .context("query load players")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode player row")?;
    let mut players = Vec::with_capacity(raw_players.len());
    for (id, name, team_id, position, price, status, chance_playing_next) in raw_players {
        players.push(PlayerInfo {
            id,
            name,
            team_id,
            position: parse_position(&position, id)?,
            price,
            status,
            chance_playing_next,
        });
    }

    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, gw, home_team_id, away_team_id, home_difficulty, away_difficulty
            FROM matches
            ORDER BY gw, id
            "#,
        )
        .context("prepare load fixtures query")?;
    let fixtures = stmt
        .query_map([], |row| {
            Ok(ScheduledFixture {
                id: row.get(0)?,
                week: row.get(1)?,
                home_team_id: row.get(2)?,
                away_team_id: row.get(3)?,
                home_difficulty: row.get(4)?,
                away_difficulty: row.get(5)?,
            })
        })
        .context("query load fixtures")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode fixture row")?;

    debug!(
        "league snapshot: {} teams, {} players, {} fixtures",
        teams.len(),
        players.len(),
        fixtures.len()
    );
    Ok(LeagueSnapshot::new(teams, players, fixtures))
}

pub fn upsert_predictions(conn: &mut Connection, predictions: &[Prediction]) -> Result<usize> {
    let created_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin predictions transaction")?;
    for p in predictions {
        tx.execute(
            r#"
            INSERT INTO predictions (gw, player_id, p_start, expected_points, model_version, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(gw, player_id) DO UPDATE SET
                p_start = excluded.p_start,
                expected_points = excluded.expected_points,
                model_version = excluded.model_version,
                created_at = excluded.created_at
            "#,
            params![
                p.week as i64,
                p.player_id as i64,
                p.start_probability,
                p.expected_points,
                p.model_version,
                created_at,
            ],
        )
        .context("upsert prediction")?;
    }
    tx.commit().context("commit predictions transaction")?;
    Ok(predictions.len())
}

pub fn load_predictions(conn: &Connection, week: u32) -> Result<Vec<Prediction>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT gw, player_id, p_start, expected_points, model_version
            FROM predictions
            WHERE gw = ?1
            ORDER BY expected_points DESC, player_id ASC
            "#,
        )
        .context("prepare load predictions query")?;
    let rows = stmt
        .query_map(params![week as i64], |row| {
            Ok(Prediction {
                week: row.get(0)?,
                player_id: row.get(1)?,
                start_probability: row.get(2)?,
                expected_points: row.get(3)?,
                model_version: row.get(4)?,
            })
        })
        .context("query load predictions")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode prediction row")?);
    }
    Ok(out)
}

/// Stored predictions joined with player attributes.
pub fn load_projected_candidates(conn: &Connection, week: u32) -> Result<Vec<ProjectedCandidate>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT pr.player_id, p.team_id, p.position, p.price, pr.p_start, pr.expected_points, p.status
            FROM predictions pr
            JOIN players p ON p.id = pr.player_id
            WHERE pr.gw = ?1
            ORDER BY pr.player_id
            "#,
        )
        .context("prepare load projected candidates query")?;
    let raw = stmt
        .query_map(params![week as i64], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .context("query load projected candidates")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode projected candidate row")?;

    let mut out = Vec::with_capacity(raw.len());
    for (player_id, team_id, position, price, start_probability, expected_points, status) in raw {
        out.push(ProjectedCandidate {
            player_id,
            team_id,
            position: parse_position(&position, player_id)?,
            price,
            start_probability,
            expected_points,
            status,
        });
    }
    Ok(out)
}

/// Realized week results joined with player attributes.
pub fn load_realized_candidates(conn: &Connection, week: u32) -> Result<Vec<RealizedCandidate>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT s.player_id, p.team_id, p.position, COALESCE(p.price, 0), s.total_points
            FROM player_gameweek_stats s
            JOIN players p ON p.id = s.player_id
            WHERE s.gw = ?1
            ORDER BY s.player_id
            "#,
        )
        .context("prepare load realized candidates query")?;
    let raw = stmt
        .query_map(params![week as i64], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i32>(4)?,
            ))
        })
        .context("query load realized candidates")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("decode realized candidate row")?;

    let mut out = Vec::with_capacity(raw.len());
    for (player_id, team_id, position, price, total_points) in raw {
        out.push(RealizedCandidate {
            player_id,
            team_id,
            position: parse_position(&position, player_id)?,
            price,
            total_points,
        });
    }
    Ok(out)
}

/// Highest gameweek with recorded stats.
pub fn latest_week(conn: &Connection) -> Result<Option<u32>> {
    conn.query_row("SELECT MAX(gw) FROM player_gameweek_stats", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .optional()
    .context("query latest gameweek")
    .map(Option::flatten)
}

fn parse_position(raw: &str, player_id: u32) -> Result<Position> {
    raw.parse::<Position>()
        .with_context(|| format!("player {player_id} has invalid position"))
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_week_is_none_on_empty_db() {
        let conn = open_in_memory().unwrap();
        assert_eq!(latest_week(&conn).unwrap(), None);
    }

    #[test]
    fn null_difficulty_loads_as_default() {
        let conn = open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO player_gameweek_stats (gw, player_id, team_id) VALUES (2, 7, 1)",
            [],
        )
        .unwrap();
        let records = load_stat_records(&conn, 1, 5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(records[0].opponent_team_id, None);
    }
}
