use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

const DB_PATH: &str = "data/tourney.sqlite";
const DB_PATH_ENV: &str = "TOURNEY_DB";

pub fn connect() -> Result<Connection> {
    let path = std::env::var(DB_PATH_ENV).unwrap_or_else(|_| DB_PATH.to_string());
    if let Some(dir) = Path::new(&path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(&path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            game       TEXT NOT NULL,
            query      TEXT NOT NULL,
            title      TEXT NOT NULL,
            pageid     INTEGER NOT NULL,
            wikitext   TEXT NOT NULL,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(game, title)
        );
        CREATE INDEX IF NOT EXISTS idx_pages_game ON pages(game);

        CREATE TABLE IF NOT EXISTS extractions (
            id           INTEGER PRIMARY KEY,
            page_id      INTEGER NOT NULL UNIQUE REFERENCES pages(id) ON DELETE CASCADE,
            teams        INTEGER NOT NULL,
            matches      INTEGER NOT NULL,
            data_json    TEXT NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Pages ──

pub struct PageRow {
    pub game: String,
    pub query: String,
    pub title: String,
    pub pageid: i64,
    pub wikitext: String,
}

/// Insert or refresh a fetched page. A refetch replaces the wikitext and
/// invalidates the stored extraction. Returns the page row id.
pub fn save_page(conn: &Connection, page: &PageRow) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let id: i64 = tx.query_row(
        "INSERT INTO pages (game, query, title, pageid, wikitext)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(game, title) DO UPDATE SET
             query = excluded.query,
             pageid = excluded.pageid,
             wikitext = excluded.wikitext,
             fetched_at = datetime('now')
         RETURNING id",
        rusqlite::params![page.game, page.query, page.title, page.pageid, page.wikitext],
        |r| r.get(0),
    )?;
    tx.execute("DELETE FROM extractions WHERE page_id = ?1", [id])?;
    tx.commit()?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub id: i64,
    pub game: String,
    pub title: String,
    pub pageid: i64,
    pub wikitext: String,
}

pub fn fetch_pages(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    query_pages(conn, "", limit)
}

/// Pages with no stored extraction yet.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    query_pages(
        conn,
        " WHERE NOT EXISTS (SELECT 1 FROM extractions e WHERE e.page_id = p.id)",
        limit,
    )
}

fn query_pages(conn: &Connection, where_clause: &str, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let sql = format!(
        "SELECT p.id, p.game, p.title, p.pageid, p.wikitext
         FROM pages p{}
         ORDER BY p.id{}",
        where_clause, limit_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                id: row.get(0)?,
                game: row.get(1)?,
                title: row.get(2)?,
                pageid: row.get(3)?,
                wikitext: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Extractions ──

pub struct ExtractionRow {
    pub page_id: i64,
    pub teams: usize,
    pub matches: usize,
    pub data_json: String,
}

pub fn save_extractions(conn: &Connection, rows: &[ExtractionRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO extractions (page_id, teams, matches, data_json)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![r.page_id, r.teams, r.matches, r.data_json])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Overview ──

pub struct OverviewRow {
    pub title: String,
    pub game: String,
    pub pageid: i64,
    pub teams: Option<usize>,
    pub matches: Option<usize>,
    pub fetched_at: String,
}

pub fn fetch_overview(conn: &Connection, game: Option<&str>, limit: usize) -> Result<Vec<OverviewRow>> {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let where_clause = match game {
        Some(g) => {
            params.push(Box::new(g.to_string()));
            " WHERE p.game = ?1"
        }
        None => "",
    };

    let sql = format!(
        "SELECT p.title, p.game, p.pageid, e.teams, e.matches, p.fetched_at
         FROM pages p
         LEFT JOIN extractions e ON e.page_id = p.id{}
         ORDER BY p.fetched_at DESC, p.id DESC
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                title: row.get(0)?,
                game: row.get(1)?,
                pageid: row.get(2)?,
                teams: row.get(3)?,
                matches: row.get(4)?,
                fetched_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub pages: usize,
    pub processed: usize,
    pub unprocessed: usize,
    pub teams: usize,
    pub matches: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let pages: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let processed: usize = conn.query_row("SELECT COUNT(*) FROM extractions", [], |r| r.get(0))?;
    let teams: usize =
        conn.query_row("SELECT COALESCE(SUM(teams), 0) FROM extractions", [], |r| r.get(0))?;
    let matches: usize =
        conn.query_row("SELECT COALESCE(SUM(matches), 0) FROM extractions", [], |r| r.get(0))?;
    Ok(Stats {
        pages,
        processed,
        unprocessed: pages - processed,
        teams,
        matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn page(title: &str, text: &str) -> PageRow {
        PageRow {
            game: "valorant".into(),
            query: title.into(),
            title: title.into(),
            pageid: 42,
            wikitext: text.into(),
        }
    }

    #[test]
    fn save_and_fetch() {
        let conn = memory();
        let id = save_page(&conn, &page("A", "==Results==")).unwrap();
        let pages = fetch_pages(&conn, None).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, id);
        assert_eq!(pages[0].wikitext, "==Results==");
    }

    #[test]
    fn refetch_replaces_and_invalidates() {
        let conn = memory();
        let id = save_page(&conn, &page("A", "old")).unwrap();
        save_extractions(
            &conn,
            &[ExtractionRow { page_id: id, teams: 2, matches: 3, data_json: "{}".into() }],
        )
        .unwrap();
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());

        let again = save_page(&conn, &page("A", "new")).unwrap();
        assert_eq!(again, id);
        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].wikitext, "new");
    }

    #[test]
    fn stats_and_overview() {
        let conn = memory();
        let a = save_page(&conn, &page("A", "x")).unwrap();
        save_page(&conn, &page("B", "y")).unwrap();
        save_extractions(
            &conn,
            &[ExtractionRow { page_id: a, teams: 8, matches: 7, data_json: "{}".into() }],
        )
        .unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.pages, s.processed, s.unprocessed), (2, 1, 1));
        assert_eq!((s.teams, s.matches), (8, 7));

        let rows = fetch_overview(&conn, Some("valorant"), 10).unwrap();
        assert_eq!(rows.len(), 2);
        let row_a = rows.iter().find(|r| r.title == "A").unwrap();
        assert_eq!(row_a.matches, Some(7));
        assert!(fetch_overview(&conn, Some("dota2"), 10).unwrap().is_empty());
    }

    #[test]
    fn limit_applies() {
        let conn = memory();
        for t in ["A", "B", "C"] {
            save_page(&conn, &page(t, "x")).unwrap();
        }
        assert_eq!(fetch_pages(&conn, Some(2)).unwrap().len(), 2);
    }
}
