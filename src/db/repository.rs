//! Database repository for stores, templates, sections and blocks.
//!
//! Uses prepared statements and transactions for data integrity. Every write
//! that touches more than one row (renumbering, block rewrites, seeding,
//! snapshots) runs inside a single transaction.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::{
    BlockNode, BlockSettings, CreateStoreRequest, CustomizationOp, CustomizationRecord,
    NewCustomization, PublishState, ResolvedSection, SectionInstance, Store, Template,
};
use crate::publish::DraftStore;

/// Section row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSection {
    pub section_type: String,
    pub settings: Value,
    pub enabled: bool,
    pub blocks: Vec<BlockNode>,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== STORE OPERATIONS ====================

    /// Provision a store. Subdomains are unique.
    pub async fn create_store(&self, request: &CreateStoreRequest) -> Result<Store, AppError> {
        if self.get_store_by_subdomain(&request.subdomain).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Subdomain {} is already taken",
                request.subdomain
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO stores (id, subdomain, name, theme_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.subdomain)
        .bind(&request.name)
        .bind(&request.theme_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO publish_state (store_id) VALUES (?)")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Store {
            id,
            subdomain: request.subdomain.clone(),
            name: request.name.clone(),
            theme_id: request.theme_id.clone(),
            created_at: now,
        })
    }

    pub async fn get_store_by_subdomain(&self, subdomain: &str) -> Result<Option<Store>, AppError> {
        let row = sqlx::query(
            "SELECT id, subdomain, name, theme_id, created_at FROM stores WHERE subdomain = ?",
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(store_from_row))
    }

    // ==================== TEMPLATE OPERATIONS ====================

    /// The store's default template for `template_type`, if it was ever created.
    pub async fn get_default_template(
        &self,
        store_id: &str,
        template_type: &str,
    ) -> Result<Option<Template>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, store_id, template_type, is_default, enabled, has_empty_sections,
                      seeded_at, created_at, updated_at
               FROM templates WHERE store_id = ? AND template_type = ? AND is_default = 1"#,
        )
        .bind(store_id)
        .bind(template_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(template_from_row))
    }

    /// Get the default template, creating it when missing. Concurrent callers
    /// converge on the same row thanks to the partial unique index.
    pub async fn ensure_default_template(
        &self,
        store_id: &str,
        template_type: &str,
    ) -> Result<Template, AppError> {
        if let Some(template) = self.get_default_template(store_id, template_type).await? {
            return Ok(template);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT OR IGNORE INTO templates
                   (id, store_id, template_type, is_default, enabled, has_empty_sections,
                    seeded_at, created_at, updated_at)
               VALUES (?, ?, ?, 1, 1, 0, NULL, ?, ?)"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(store_id)
        .bind(template_type)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Created {} template for store {}", template_type, store_id);

        self.get_default_template(store_id, template_type)
            .await?
            .ok_or_else(|| AppError::Internal("Template vanished after insert".to_string()))
    }

    /// Materialize `baseline` as rows, at most once per template.
    ///
    /// The seed is claimed with a conditional update on `seeded_at IS NULL`, so
    /// of any number of concurrent callers exactly one inserts. A template the
    /// user has emptied on purpose is never seeded. Returns whether rows were
    /// inserted by this call.
    pub async fn seed_sections(
        &self,
        template_id: &str,
        baseline: &[ResolvedSection],
    ) -> Result<bool, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"UPDATE templates SET seeded_at = ?
               WHERE id = ? AND seeded_at IS NULL AND has_empty_sections = 0"#,
        )
        .bind(&now)
        .bind(template_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            return Ok(false);
        }

        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sections WHERE template_id = ?")
            .bind(template_id)
            .fetch_one(&mut *tx)
            .await?
            .get("n");

        if existing > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        for (position, section) in baseline.iter().enumerate() {
            let section_id = uuid::Uuid::new_v4().to_string();
            insert_section_row(
                &mut tx,
                &section_id,
                template_id,
                &NewSection {
                    section_type: section.section_type.clone(),
                    settings: section.settings.clone(),
                    enabled: section.enabled,
                    blocks: section.blocks.clone(),
                },
                position as i64,
                &now,
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            "Seeded {} baseline sections into template {}",
            baseline.len(),
            template_id
        );
        Ok(true)
    }

    pub async fn list_templates(&self, store_id: &str) -> Result<Vec<Template>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, store_id, template_type, is_default, enabled, has_empty_sections,
                      seeded_at, created_at, updated_at
               FROM templates WHERE store_id = ? ORDER BY template_type"#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    // ==================== SECTION OPERATIONS ====================

    /// Sections of a template ordered by position, each with its block rows.
    pub async fn list_sections(&self, template_id: &str) -> Result<Vec<SectionInstance>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, template_id, section_type, position, enabled, settings, created_at, updated_at
               FROM sections WHERE template_id = ? ORDER BY position, created_at"#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        let mut sections = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut section = section_from_row(row)?;
            section.blocks = self.list_blocks(&section.id).await?;
            sections.push(section);
        }
        Ok(sections)
    }

    pub async fn get_section(&self, section_id: &str) -> Result<Option<SectionInstance>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, template_id, section_type, position, enabled, settings, created_at, updated_at
               FROM sections WHERE id = ?"#,
        )
        .bind(section_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut section = section_from_row(&row)?;
        section.blocks = self.list_blocks(section_id).await?;
        Ok(Some(section))
    }

    async fn list_blocks(&self, section_id: &str) -> Result<Vec<BlockNode>, AppError> {
        let rows = sqlx::query(
            "SELECT id, block_type, position, settings FROM blocks WHERE section_id = ? ORDER BY position",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(block_from_row).collect()
    }

    /// Insert a section. With `position` the section is spliced in at that index
    /// (clamped to the current length) and later sections shift down by one;
    /// otherwise it is appended.
    pub async fn insert_section(
        &self,
        template_id: &str,
        section: &NewSection,
        position: Option<i64>,
    ) -> Result<SectionInstance, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sections WHERE template_id = ?")
            .bind(template_id)
            .fetch_one(&mut *tx)
            .await?
            .get("n");

        let position = match position {
            Some(p) => p.clamp(0, count),
            None => count,
        };

        if position < count {
            sqlx::query(
                "UPDATE sections SET position = position + 1 WHERE template_id = ? AND position >= ?",
            )
            .bind(template_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        insert_section_row(&mut tx, &id, template_id, section, position, &now).await?;

        sqlx::query("UPDATE templates SET has_empty_sections = 0, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(template_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(SectionInstance {
            id,
            template_id: template_id.to_string(),
            section_type: section.section_type.clone(),
            position,
            enabled: section.enabled,
            settings: section.settings.clone(),
            blocks: positioned(&section.blocks),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn update_section(
        &self,
        section_id: &str,
        settings: &Value,
        enabled: bool,
    ) -> Result<SectionInstance, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sections SET settings = ?, enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(settings)?)
        .bind(enabled as i32)
        .bind(&now)
        .bind(section_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Section", section_id));
        }

        self.get_section(section_id)
            .await?
            .ok_or_else(|| AppError::not_found("Section", section_id))
    }

    /// Delete a section and close the gap it leaves. When the template ends up
    /// empty it is flagged so it is never re-seeded. Returns whether the
    /// template is now empty.
    pub async fn delete_section(&self, section_id: &str) -> Result<bool, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT template_id, position FROM sections WHERE id = ?")
            .bind(section_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Section", section_id))?;
        let template_id: String = row.get("template_id");
        let position: i64 = row.get("position");

        sqlx::query("DELETE FROM blocks WHERE section_id = ?")
            .bind(section_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sections WHERE id = ?")
            .bind(section_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE sections SET position = position - 1 WHERE template_id = ? AND position > ?",
        )
        .bind(&template_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sections WHERE template_id = ?")
            .bind(&template_id)
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        let now_empty = remaining == 0;

        sqlx::query(
            "UPDATE templates SET has_empty_sections = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now_empty as i32)
        .bind(&now)
        .bind(&template_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(now_empty)
    }

    /// Assign positions `0..n` following `ordered_ids`. The caller passes every
    /// section id of the template.
    pub async fn reorder_sections(
        &self,
        template_id: &str,
        ordered_ids: &[String],
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (position, id) in ordered_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE sections SET position = ?, updated_at = ? WHERE id = ? AND template_id = ?",
            )
            .bind(position as i64)
            .bind(&now)
            .bind(id)
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrite a section's top-level block rows from `blocks`, assigning dense
    /// positions in list order. Nested children ride along inside settings.
    pub async fn replace_blocks(
        &self,
        section_id: &str,
        blocks: &[BlockNode],
    ) -> Result<Vec<BlockNode>, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM blocks WHERE section_id = ?")
            .bind(section_id)
            .execute(&mut *tx)
            .await?;
        let blocks = positioned(blocks);
        insert_block_rows(&mut tx, section_id, &blocks, &now).await?;

        sqlx::query("UPDATE sections SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(section_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(blocks)
    }

    // ==================== CUSTOMIZATION LOG ====================

    pub async fn append_customization(
        &self,
        store_id: &str,
        template_id: &str,
        change: &NewCustomization,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO customizations
                   (store_id, template_id, op, section_id, block_id, payload, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(store_id)
        .bind(template_id)
        .bind(change.op.as_str())
        .bind(&change.section_id)
        .bind(&change.block_id)
        .bind(serde_json::to_string(&change.payload)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The store's customization log, oldest first.
    pub async fn list_customizations(
        &self,
        store_id: &str,
    ) -> Result<Vec<CustomizationRecord>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, store_id, template_id, op, section_id, block_id, payload, created_at
               FROM customizations WHERE store_id = ? ORDER BY id"#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(customization_from_row).collect()
    }

    // ==================== SNAPSHOTS ====================

    /// What the live storefront serves for a template, if the store ever published it.
    pub async fn get_published_snapshot(
        &self,
        store_id: &str,
        template_type: &str,
    ) -> Result<Option<Vec<ResolvedSection>>, AppError> {
        let row = sqlx::query(
            r#"SELECT sections FROM template_snapshots
               WHERE store_id = ? AND template_type = ? AND kind = 'published'"#,
        )
        .bind(store_id)
        .bind(template_type)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("sections");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DraftStore for Repository {
    async fn load_state(&self, store_id: &str) -> Result<PublishState, AppError> {
        let row = sqlx::query(
            r#"SELECT change_seq, saved_seq, is_draft, last_saved_at, published_at
               FROM publish_state WHERE store_id = ?"#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Store", store_id))?;

        let is_draft: i32 = row.get("is_draft");
        Ok(PublishState::from_counters(
            row.get("change_seq"),
            row.get("saved_seq"),
            is_draft != 0,
            row.get("last_saved_at"),
            row.get("published_at"),
        ))
    }

    async fn record_change(&self, store_id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE publish_state SET change_seq = change_seq + 1, is_draft = 1 WHERE store_id = ?",
        )
        .bind(store_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Store", store_id));
        }
        Ok(())
    }

    /// Snapshot every template of the store as its draft and mark the changes
    /// seen so far as saved. Changes recorded while this runs stay pending.
    async fn write_draft(&self, store_id: &str) -> Result<String, AppError> {
        let now = Utc::now().to_rfc3339();

        let seq_row = sqlx::query("SELECT change_seq FROM publish_state WHERE store_id = ?")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Store", store_id))?;
        let captured_seq: i64 = seq_row.get("change_seq");

        let mut snapshots = Vec::new();
        for template in self.list_templates(store_id).await? {
            let sections: Vec<ResolvedSection> = self
                .list_sections(&template.id)
                .await?
                .iter()
                .map(ResolvedSection::from)
                .collect();
            snapshots.push((template.template_type, serde_json::to_string(&sections)?));
        }

        let mut tx = self.pool.begin().await?;
        for (template_type, sections) in &snapshots {
            sqlx::query(
                r#"INSERT OR REPLACE INTO template_snapshots
                       (store_id, template_type, kind, sections, created_at)
                   VALUES (?, ?, 'draft', ?, ?)"#,
            )
            .bind(store_id)
            .bind(template_type)
            .bind(sections)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            r#"UPDATE publish_state SET saved_seq = MAX(saved_seq, ?), is_draft = 1, last_saved_at = ?
               WHERE store_id = ?"#,
        )
        .bind(captured_seq)
        .bind(&now)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(
            "Saved draft for store {} ({} templates)",
            store_id,
            snapshots.len()
        );
        Ok(now)
    }

    /// Copy the draft snapshots over the published ones in one transaction.
    async fn promote_draft(&self, store_id: &str) -> Result<String, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO template_snapshots
                   (store_id, template_type, kind, sections, created_at)
               SELECT store_id, template_type, 'published', sections, ?
               FROM template_snapshots WHERE store_id = ? AND kind = 'draft'"#,
        )
        .bind(&now)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE publish_state
               SET is_draft = CASE WHEN change_seq > saved_seq THEN 1 ELSE 0 END, published_at = ?
               WHERE store_id = ?"#,
        )
        .bind(&now)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(now)
    }
}

// Helper functions for writes shared by seeding and inserts

async fn insert_section_row(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    template_id: &str,
    section: &NewSection,
    position: i64,
    now: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO sections
               (id, template_id, section_type, position, enabled, settings, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(id)
    .bind(template_id)
    .bind(&section.section_type)
    .bind(position)
    .bind(section.enabled as i32)
    .bind(serde_json::to_string(&section.settings)?)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    insert_block_rows(tx, id, &positioned(&section.blocks), now).await
}

async fn insert_block_rows(
    tx: &mut Transaction<'_, Sqlite>,
    section_id: &str,
    blocks: &[BlockNode],
    now: &str,
) -> Result<(), AppError> {
    for block in blocks {
        sqlx::query(
            r#"INSERT INTO blocks (section_id, id, block_type, position, settings, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(section_id)
        .bind(&block.id)
        .bind(&block.kind)
        .bind(block.position)
        .bind(serde_json::to_string(&block.settings)?)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn positioned(blocks: &[BlockNode]) -> Vec<BlockNode> {
    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| BlockNode {
            position: index as i64,
            ..block.clone()
        })
        .collect()
}

// Helper functions for row conversion

fn store_from_row(row: &SqliteRow) -> Store {
    Store {
        id: row.get("id"),
        subdomain: row.get("subdomain"),
        name: row.get("name"),
        theme_id: row.get("theme_id"),
        created_at: row.get("created_at"),
    }
}

fn template_from_row(row: &SqliteRow) -> Template {
    let is_default: i32 = row.get("is_default");
    let enabled: i32 = row.get("enabled");
    let has_empty_sections: i32 = row.get("has_empty_sections");
    Template {
        id: row.get("id"),
        store_id: row.get("store_id"),
        template_type: row.get("template_type"),
        is_default: is_default != 0,
        enabled: enabled != 0,
        has_empty_sections: has_empty_sections != 0,
        seeded_at: row.get("seeded_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn section_from_row(row: &SqliteRow) -> Result<SectionInstance, AppError> {
    let enabled: i32 = row.get("enabled");
    let settings: String = row.get("settings");
    Ok(SectionInstance {
        id: row.get("id"),
        template_id: row.get("template_id"),
        section_type: row.get("section_type"),
        position: row.get("position"),
        enabled: enabled != 0,
        settings: serde_json::from_str(&settings)?,
        blocks: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn block_from_row(row: &SqliteRow) -> Result<BlockNode, AppError> {
    let settings: String = row.get("settings");
    let settings: BlockSettings = serde_json::from_str(&settings)?;
    Ok(BlockNode {
        id: row.get("id"),
        kind: row.get("block_type"),
        position: row.get("position"),
        settings,
    })
}

fn customization_from_row(row: &SqliteRow) -> Result<CustomizationRecord, AppError> {
    let op: String = row.get("op");
    let payload: String = row.get("payload");
    Ok(CustomizationRecord {
        id: row.get("id"),
        store_id: row.get("store_id"),
        template_id: row.get("template_id"),
        op: CustomizationOp::parse(&op)
            .ok_or_else(|| AppError::Internal(format!("Unknown customization op {}", op)))?,
        section_id: row.get("section_id"),
        block_id: row.get("block_id"),
        payload: serde_json::from_str(&payload)?,
        created_at: row.get("created_at"),
    })
}
