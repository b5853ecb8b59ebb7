//! Relational backend: SQLite with an FTS5 feature index and recursive CTEs.
//!
//! Nodes are stored with their canonical JSON plus extracted columns for
//! indexed filtering; edges live in a keyed table with ON DELETE CASCADE so
//! node removal cascades in the database itself. Every public write runs in
//! its own transaction.

use crate::schema::{open_database, open_in_memory, store_err};
use crate::traits::{EdgeFilter, GraphStore, NodeFilter, NodePatch, ScoredNode};
use repograph_core::{
    DependencyType, Edge, EdgeFamily, EdgeKey, EdgeKind, Node, RpgError, RpgResult,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-backed [`GraphStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> RpgResult<Self> {
        Ok(Self {
            conn: open_database(path)?,
        })
    }

    /// Open an ephemeral in-memory database.
    pub fn open_in_memory() -> RpgResult<Self> {
        Ok(Self {
            conn: open_in_memory()?,
        })
    }

    fn row_to_node(data: &str) -> RpgResult<Node> {
        serde_json::from_str(data)
            .map_err(|e| RpgError::Store(format!("corrupt node row: {e}")))
    }

    fn fetch_node(&self, id: &str) -> RpgResult<Option<Node>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM nodes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(store_err)?;
        data.map(|d| Self::row_to_node(&d)).transpose()
    }

    /// Write a node row and its FTS mirror inside an open transaction.
    fn upsert_node_tx(tx: &rusqlite::Transaction<'_>, node: &Node) -> RpgResult<()> {
        let data = serde_json::to_string(node)
            .map_err(|e| RpgError::Store(format!("failed to serialize node: {e}")))?;
        let kind = if node.is_high_level() {
            "high_level"
        } else {
            "low_level"
        };
        let meta = node.metadata();
        let entity_type = meta.map(|m| m.entity_type.as_str());
        let language = meta.and_then(|m| m.language).map(|l| l.name());
        let path = meta.and_then(|m| m.path.clone());

        tx.execute(
            "INSERT INTO nodes (id, kind, entity_type, language, path, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               kind = excluded.kind,
               entity_type = excluded.entity_type,
               language = excluded.language,
               path = excluded.path,
               data = excluded.data",
            params![node.id(), kind, entity_type, language, path, data],
        )
        .map_err(store_err)?;

        let feature = node.feature();
        tx.execute(
            "DELETE FROM node_fts WHERE id = ?1",
            params![node.id()],
        )
        .map_err(store_err)?;
        tx.execute(
            "INSERT INTO node_fts (id, description, keywords, sub_features)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                node.id(),
                feature.description,
                feature.keywords.join(" "),
                feature.sub_features.join(" "),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
        let source: String = row.get("source")?;
        let target: String = row.get("target")?;
        let family: String = row.get("family")?;
        if family == "functional" {
            Ok(Edge::Functional {
                source,
                target,
                level: row.get::<_, Option<u32>>("level")?,
                sibling_order: row.get::<_, Option<u32>>("sibling_order")?,
            })
        } else {
            let dep: String = row.get("dependency_type")?;
            Ok(Edge::Dependency {
                source,
                target,
                dependency_type: parse_dependency_type(&dep),
                is_runtime: row.get::<_, Option<bool>>("is_runtime")?,
                line: row
                    .get::<_, Option<i64>>("line")?
                    .map(|l| l as usize),
            })
        }
    }

    fn family_columns(kind: EdgeKind) -> (&'static str, &'static str) {
        match kind {
            EdgeKind::Functional => ("functional", ""),
            EdgeKind::Dependency(dep) => ("dependency", dep.as_str()),
        }
    }
}

fn parse_dependency_type(s: &str) -> DependencyType {
    match s {
        "import" => DependencyType::Import,
        "call" => DependencyType::Call,
        "inherit" => DependencyType::Inherit,
        "implement" => DependencyType::Implement,
        _ => DependencyType::Use,
    }
}

/// Build an FTS5 MATCH expression from free text: each term quoted, OR-joined.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

const EDGE_COLUMNS: &str =
    "source, target, family, dependency_type, level, sibling_order, is_runtime, line";

impl GraphStore for SqliteStore {
    fn add_node(&mut self, node: Node) -> RpgResult<()> {
        let tx = self.conn.transaction().map_err(store_err)?;
        Self::upsert_node_tx(&tx, &node)?;
        tx.commit().map_err(store_err)
    }

    fn get_node(&self, id: &str) -> RpgResult<Node> {
        self.fetch_node(id)?
            .ok_or_else(|| RpgError::node_not_found(id))
    }

    fn has_node(&self, id: &str) -> bool {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .unwrap_or(false)
    }

    fn update_node(&mut self, id: &str, patch: &NodePatch) -> RpgResult<Node> {
        let mut node = self.get_node(id)?;
        patch.apply(&mut node);
        let tx = self.conn.transaction().map_err(store_err)?;
        Self::upsert_node_tx(&tx, &node)?;
        tx.commit().map_err(store_err)?;
        Ok(node)
    }

    fn remove_node(&mut self, id: &str) -> RpgResult<()> {
        let tx = self.conn.transaction().map_err(store_err)?;
        let removed = tx
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])
            .map_err(store_err)?;
        if removed == 0 {
            return Err(RpgError::node_not_found(id));
        }
        // Incident edges cascade via the foreign keys.
        tx.execute("DELETE FROM node_fts WHERE id = ?1", params![id])
            .map_err(store_err)?;
        tx.commit().map_err(store_err)
    }

    fn nodes(&self, filter: &NodeFilter) -> RpgResult<Vec<Node>> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM nodes ORDER BY id")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut out = Vec::new();
        for data in rows {
            let node = Self::row_to_node(&data.map_err(store_err)?)?;
            if filter.matches(&node) {
                out.push(node);
            }
        }
        Ok(out)
    }

    fn node_count(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get::<_, i64>(0))
            .map(|c| c as usize)
            .unwrap_or(0)
    }

    fn add_edge(&mut self, edge: Edge) -> RpgResult<bool> {
        for endpoint in [edge.source(), edge.target()] {
            if !self.has_node(endpoint) {
                return Err(RpgError::Validation(format!(
                    "edge endpoint {endpoint} does not exist"
                )));
            }
        }
        let (family, dep) = Self::family_columns(edge.kind());
        let (level, sibling_order, is_runtime, line) = match &edge {
            Edge::Functional {
                level,
                sibling_order,
                ..
            } => (*level, *sibling_order, None, None),
            Edge::Dependency {
                is_runtime, line, ..
            } => (None, None, *is_runtime, line.map(|l| l as i64)),
        };
        let tx = self.conn.transaction().map_err(store_err)?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO edges
                   (source, target, family, dependency_type, level, sibling_order, is_runtime, line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    edge.source(),
                    edge.target(),
                    family,
                    dep,
                    level,
                    sibling_order,
                    is_runtime,
                    line
                ],
            )
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(inserted > 0)
    }

    fn remove_edge(&mut self, key: &EdgeKey) -> RpgResult<()> {
        let (family, dep) = Self::family_columns(key.kind);
        let removed = self
            .conn
            .execute(
                "DELETE FROM edges
                 WHERE source = ?1 AND target = ?2 AND family = ?3 AND dependency_type = ?4",
                params![key.source, key.target, family, dep],
            )
            .map_err(store_err)?;
        if removed == 0 {
            return Err(RpgError::NotFound(format!(
                "edge {} -> {}",
                key.source, key.target
            )));
        }
        Ok(())
    }

    fn edges(&self, filter: &EdgeFilter) -> RpgResult<Vec<Edge>> {
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges
             ORDER BY source, target, family, dependency_type"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt.query_map([], Self::row_to_edge).map_err(store_err)?;
        let mut out = Vec::new();
        for edge in rows {
            let edge = edge.map_err(store_err)?;
            if filter.matches(&edge) {
                out.push(edge);
            }
        }
        Ok(out)
    }

    fn edge_count(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get::<_, i64>(0))
            .map(|c| c as usize)
            .unwrap_or(0)
    }

    fn out_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        self.edges_of(id, "source", family)
    }

    fn in_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        self.edges_of(id, "target", family)
    }

    /// Functional subtree closure via a recursive CTE.
    fn subtree_ids(&self, root: &str) -> RpgResult<Vec<String>> {
        if !self.has_node(root) {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare(
                "WITH RECURSIVE closure(id) AS (
                     SELECT ?1
                     UNION
                     SELECT e.target FROM edges e
                     JOIN closure c ON e.source = c.id
                     WHERE e.family = 'functional'
                 )
                 SELECT id FROM closure",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![root], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut out = Vec::new();
        for id in rows {
            out.push(id.map_err(store_err)?);
        }
        Ok(out)
    }

    fn search_by_feature(&self, query: &str, scopes: &[String]) -> RpgResult<Vec<ScoredNode>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        // BM25 weights per field: description > keywords > sub-features.
        let mut hits: Vec<(String, f64)> = Vec::new();
        if scopes.is_empty() {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT id, bm25(node_fts, 0.0, 3.0, 2.0, 1.0) AS rank
                     FROM node_fts WHERE node_fts MATCH ?1 ORDER BY rank",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map(params![match_expr], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })
                .map_err(store_err)?;
            for row in rows {
                hits.push(row.map_err(store_err)?);
            }
        } else {
            // Scope natively: join the FTS hits against the recursive
            // closure of the scope roots over functional edges.
            let scope_json = serde_json::to_string(scopes)
                .map_err(|e| RpgError::Store(e.to_string()))?;
            let mut stmt = self
                .conn
                .prepare(
                    "WITH RECURSIVE closure(id) AS (
                         SELECT value FROM json_each(?1)
                         UNION
                         SELECT e.target FROM edges e
                         JOIN closure c ON e.source = c.id
                         WHERE e.family = 'functional'
                     )
                     SELECT f.id, bm25(node_fts, 0.0, 3.0, 2.0, 1.0) AS rank
                     FROM node_fts f
                     JOIN closure c ON f.id = c.id
                     WHERE node_fts MATCH ?2
                     ORDER BY rank",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map(params![scope_json, match_expr], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })
                .map_err(store_err)?;
            for row in rows {
                hits.push(row.map_err(store_err)?);
            }
        }

        let mut out = Vec::new();
        for (id, rank) in hits {
            if let Some(node) = self.fetch_node(&id)? {
                // bm25 ranks ascending (more negative = better); flip sign so
                // callers see higher-is-better scores.
                out.push(ScoredNode { node, score: -rank });
            }
        }
        Ok(out)
    }

    fn clear(&mut self) -> RpgResult<()> {
        let tx = self.conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM edges", []).map_err(store_err)?;
        tx.execute("DELETE FROM nodes", []).map_err(store_err)?;
        tx.execute("DELETE FROM node_fts", []).map_err(store_err)?;
        tx.commit().map_err(store_err)
    }
}

impl SqliteStore {
    fn edges_of(&self, id: &str, endpoint: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        let family_clause = match family {
            EdgeFamily::Functional => " AND family = 'functional'",
            EdgeFamily::Dependency => " AND family = 'dependency'",
            EdgeFamily::Both => "",
        };
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE {endpoint} = ?1{family_clause}
             ORDER BY source, target, family, dependency_type"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![id], Self::row_to_edge)
            .map_err(store_err)?;
        let mut out = Vec::new();
        for edge in rows {
            out.push(edge.map_err(store_err)?);
        }
        Ok(out)
    }
}
