//! Hybrid section resolution.
//!
//! The effective section list of a store's template blends two sources: the
//! static theme baseline and the store's persisted section rows. Callers always
//! get the same normalized [`ResolvedSection`] shape and never learn where a
//! section came from.
//!
//! A template's baseline is materialized as rows once, the first time the
//! template is resolved for editing. From then on the rows are authoritative;
//! a template the user emptied stays empty.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use crate::blocks::{
    add_block_to_tree, delete_block_from_tree, duplicate_block, find_block_in_tree,
    flatten_blocks, reorder_blocks_in_tree, update_block_in_tree, validate_block,
};
use crate::db::{NewSection, Repository};
use crate::errors::AppError;
use crate::models::{
    AddBlockRequest, AddSectionRequest, BlockNode, BlockPatch, CustomizationOp, NewCustomization,
    Placement, ResolvedSection, SectionInstance, Store, Template, UpdateSectionRequest,
};
use crate::settings::{merge_settings, normalize_settings, preset_settings};
use crate::theme::{SectionSchema, ThemeCatalog, ThemeDefinition};

type Baseline = Arc<Vec<ResolvedSection>>;

pub struct HybridLoader {
    repo: Arc<Repository>,
    themes: Arc<ThemeCatalog>,
    /// Compiled baselines keyed by `store:theme:template_type`.
    baselines: RwLock<HashMap<String, Baseline>>,
}

/// Result of duplicating a block.
#[derive(Debug, Clone)]
pub struct DuplicatedBlock {
    pub section: ResolvedSection,
    pub copy: Option<BlockNode>,
}

impl HybridLoader {
    pub fn new(repo: Arc<Repository>, themes: Arc<ThemeCatalog>) -> Self {
        Self {
            repo,
            themes,
            baselines: RwLock::new(HashMap::new()),
        }
    }

    pub async fn store(&self, subdomain: &str) -> Result<Store, AppError> {
        self.repo
            .get_store_by_subdomain(subdomain)
            .await?
            .ok_or_else(|| AppError::not_found("Store", subdomain))
    }

    fn theme(&self, store: &Store) -> Result<&ThemeDefinition, AppError> {
        self.themes.get(&store.theme_id)
    }

    /// The compiled theme baseline for a template type, memoized.
    fn baseline(&self, store: &Store, template_type: &str) -> Result<Baseline, AppError> {
        let key = format!("{}:{}:{}", store.id, store.theme_id, template_type);
        if let Some(hit) = self
            .baselines
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(self.theme(store)?.compile_template(template_type)?);
        tracing::debug!(
            "Compiled baseline {} ({} sections)",
            key,
            compiled.len()
        );
        self.baselines
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Look up or create the store's default template, seeding it from the
    /// baseline the first time.
    pub async fn ensure_template(
        &self,
        store: &Store,
        template_type: &str,
    ) -> Result<Template, AppError> {
        // A theme without this template type is a not-found before any row exists.
        let baseline = self.baseline(store, template_type)?;
        let template = self
            .repo
            .ensure_default_template(&store.id, template_type)
            .await?;

        if template.seeded_at.is_none() && !template.has_empty_sections {
            self.repo.seed_sections(&template.id, &baseline).await?;
        }
        Ok(template)
    }

    /// Effective sections of a template for editing.
    pub async fn resolve(
        &self,
        store: &Store,
        template_type: &str,
    ) -> Result<Vec<ResolvedSection>, AppError> {
        let template = self.ensure_template(store, template_type).await?;
        self.sections_of(store, &template).await
    }

    async fn sections_of(
        &self,
        store: &Store,
        template: &Template,
    ) -> Result<Vec<ResolvedSection>, AppError> {
        let rows = self.repo.list_sections(&template.id).await?;
        if !rows.is_empty() {
            return Ok(rows.iter().map(ResolvedSection::from).collect());
        }
        if template.has_empty_sections {
            tracing::debug!("Template {} was emptied by the store", template.id);
            return Ok(Vec::new());
        }
        Ok(self.baseline(store, &template.template_type)?.to_vec())
    }

    /// What the live storefront serves: the published snapshot when the store
    /// has published, otherwise the current sections without creating anything.
    /// Disabled sections are left out.
    pub async fn resolve_published(
        &self,
        store: &Store,
        template_type: &str,
    ) -> Result<Vec<ResolvedSection>, AppError> {
        let sections = match self
            .repo
            .get_published_snapshot(&store.id, template_type)
            .await?
        {
            Some(snapshot) => snapshot,
            None => match self
                .repo
                .get_default_template(&store.id, template_type)
                .await?
            {
                Some(template) => self.sections_of(store, &template).await?,
                None => self.baseline(store, template_type)?.to_vec(),
            },
        };
        Ok(sections.into_iter().filter(|s| s.enabled).collect())
    }

    // ==================== SECTION MUTATIONS ====================

    pub async fn add_section(
        &self,
        store: &Store,
        template_type: &str,
        request: &AddSectionRequest,
    ) -> Result<ResolvedSection, AppError> {
        let theme = self.theme(store)?;
        let schema = theme.section_schema(&request.section_type)?;
        let template = self.ensure_template(store, template_type).await?;

        if schema.singleton {
            let existing = self.repo.list_sections(&template.id).await?;
            if existing
                .iter()
                .any(|s| s.section_type == request.section_type)
            {
                return Err(AppError::Conflict(format!(
                    "Template {} already has a '{}' section",
                    template_type, request.section_type
                )));
            }
        }

        let mut overlay = json!({});
        if let Some(name) = &request.preset {
            overlay = preset_settings(&request.section_type, name).ok_or_else(|| {
                AppError::Validation(format!(
                    "Unknown preset '{}' for section type '{}'",
                    name, request.section_type
                ))
            })?;
        }
        if let Some(settings) = &request.settings {
            overlay = merge_settings(&overlay, settings);
        }
        let settings = theme.section_settings(&request.section_type, &overlay)?;

        let blocks = request.blocks.clone().unwrap_or_default();
        check_new_blocks(schema, &[], &blocks, true)?;
        check_block_limits(schema, &blocks)?;

        let section = self
            .repo
            .insert_section(
                &template.id,
                &NewSection {
                    section_type: request.section_type.clone(),
                    settings,
                    enabled: request.enabled.unwrap_or(true),
                    blocks,
                },
                request.position,
            )
            .await?;

        let resolved = ResolvedSection::from(&section);
        self.record(
            store,
            &template,
            NewCustomization::section(
                CustomizationOp::Add,
                &section.id,
                serde_json::to_value(&resolved)?,
            ),
        )
        .await?;

        tracing::info!(
            "Added {} section {} to {} of store {}",
            request.section_type,
            section.id,
            template_type,
            store.subdomain
        );
        Ok(resolved)
    }

    /// Merge settings into a section and/or toggle it.
    pub async fn update_section(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        request: &UpdateSectionRequest,
    ) -> Result<ResolvedSection, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;

        let settings = match &request.settings {
            Some(patch) => normalize_settings(
                &section.section_type,
                &merge_settings(&section.settings, patch),
            )?,
            None => section.settings.clone(),
        };
        let enabled = request.enabled.unwrap_or(section.enabled);

        let updated = self
            .repo
            .update_section(section_id, &settings, enabled)
            .await?;

        let mut payload = json!({});
        if let Some(patch) = &request.settings {
            payload["settings"] = patch.clone();
        }
        if let Some(enabled) = request.enabled {
            payload["enabled"] = Value::Bool(enabled);
        }
        self.record(
            store,
            &template,
            NewCustomization::section(CustomizationOp::Update, section_id, payload),
        )
        .await?;

        Ok(ResolvedSection::from(&updated))
    }

    /// Remove a section. Sections the theme marks as required cannot be removed.
    pub async fn remove_section(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
    ) -> Result<(), AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;

        let required = self
            .theme(store)?
            .sections
            .get(&section.section_type)
            .is_some_and(|schema| schema.required);
        if required {
            return Err(AppError::Validation(format!(
                "Section type '{}' is required and cannot be removed",
                section.section_type
            )));
        }

        let now_empty = self.repo.delete_section(section_id).await?;
        self.record(
            store,
            &template,
            NewCustomization::section(
                CustomizationOp::Remove,
                section_id,
                json!({ "type": section.section_type, "position": section.position }),
            ),
        )
        .await?;

        if now_empty {
            tracing::info!("Template {} of store {} is now empty", template_type, store.subdomain);
        }
        Ok(())
    }

    /// Put the listed sections first, in the given order; unlisted sections
    /// follow in their current order. Unknown ids are ignored.
    pub async fn reorder_sections(
        &self,
        store: &Store,
        template_type: &str,
        section_ids: &[String],
    ) -> Result<Vec<ResolvedSection>, AppError> {
        let template = self.ensure_template(store, template_type).await?;
        let current = self.repo.list_sections(&template.id).await?;

        let known: HashSet<&str> = current.iter().map(|s| s.id.as_str()).collect();
        let mut ordered: Vec<String> = Vec::with_capacity(current.len());
        for id in section_ids {
            if known.contains(id.as_str()) && !ordered.contains(id) {
                ordered.push(id.clone());
            }
        }
        for section in &current {
            if !ordered.contains(&section.id) {
                ordered.push(section.id.clone());
            }
        }

        self.repo.reorder_sections(&template.id, &ordered).await?;

        for (position, id) in ordered.iter().enumerate() {
            let moved = current
                .iter()
                .any(|s| &s.id == id && s.position != position as i64);
            if moved {
                self.record(
                    store,
                    &template,
                    NewCustomization::section(
                        CustomizationOp::Update,
                        id,
                        json!({ "position": position }),
                    ),
                )
                .await?;
            }
        }

        self.sections_of(store, &template).await
    }

    // ==================== BLOCK MUTATIONS ====================

    pub async fn add_block(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        request: &AddBlockRequest,
    ) -> Result<ResolvedSection, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;
        let schema = self.theme(store)?.section_schema(&section.section_type)?;

        if let Some(target) = &request.target_id {
            if find_block_in_tree(&section.blocks, target).is_none() {
                return Err(AppError::not_found("Block", target));
            }
            if request.placement == Placement::Inside {
                let is_container = find_block_in_tree(&section.blocks, target)
                    .is_some_and(|b| b.is_container());
                if !is_container {
                    return Err(AppError::Validation(format!(
                        "Block {} is not a container",
                        target
                    )));
                }
            }
        }
        // Allowed block types only constrain the section's top level.
        let top_level = match &request.target_id {
            None => true,
            Some(target) => {
                request.placement != Placement::Inside
                    && section.blocks.iter().any(|b| &b.id == target)
            }
        };
        check_new_blocks(
            schema,
            &section.blocks,
            std::slice::from_ref(&request.block),
            top_level,
        )?;

        let tree = add_block_to_tree(
            &section.blocks,
            request.block.clone(),
            request.target_id.as_deref(),
            request.placement,
        );
        check_block_limits(schema, &tree)?;

        let updated = self
            .write_blocks(
                store,
                &template,
                section,
                tree,
                NewCustomization::block(
                    CustomizationOp::Add,
                    section_id,
                    &request.block.id,
                    serde_json::to_value(&request.block)?,
                ),
            )
            .await?;
        Ok(updated)
    }

    /// Patch a block at any depth. An unknown block id changes nothing.
    pub async fn update_block(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        block_id: &str,
        patch: &BlockPatch,
    ) -> Result<ResolvedSection, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;
        let Some(existing) = find_block_in_tree(&section.blocks, block_id) else {
            return Ok(ResolvedSection::from(&section));
        };
        let schema = self.theme(store)?.section_schema(&section.section_type)?;

        // The patched node is checked like a new block against everything else.
        let others = delete_block_from_tree(&section.blocks, block_id);
        let top_level = section.blocks.iter().any(|b| b.id == block_id);
        check_new_blocks(schema, &others, &[patch.apply(existing)], top_level)?;

        let tree = update_block_in_tree(&section.blocks, block_id, patch);
        check_block_limits(schema, &tree)?;
        let payload = serde_json::to_value(find_block_in_tree(&tree, block_id))?;
        self.write_blocks(
            store,
            &template,
            section,
            tree,
            NewCustomization::block(CustomizationOp::Update, section_id, block_id, payload),
        )
        .await
    }

    /// Delete a block at any depth. An unknown block id changes nothing.
    pub async fn delete_block(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        block_id: &str,
    ) -> Result<ResolvedSection, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;
        if find_block_in_tree(&section.blocks, block_id).is_none() {
            return Ok(ResolvedSection::from(&section));
        }

        let tree = delete_block_from_tree(&section.blocks, block_id);
        self.write_blocks(
            store,
            &template,
            section,
            tree,
            NewCustomization::block(CustomizationOp::Remove, section_id, block_id, json!({})),
        )
        .await
    }

    pub async fn reorder_blocks(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        block_ids: &[String],
    ) -> Result<ResolvedSection, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;
        let tree = reorder_blocks_in_tree(&section.blocks, block_ids);
        let order: Vec<&str> = tree.iter().map(|b| b.id.as_str()).collect();
        let payload = json!({ "blockOrder": order });

        self.write_blocks(
            store,
            &template,
            section,
            tree,
            NewCustomization::section(CustomizationOp::Update, section_id, payload),
        )
        .await
    }

    /// Deep-copy a block (fresh ids throughout) and insert the copy right after
    /// the original, at the original's level.
    pub async fn duplicate_block(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
        block_id: &str,
    ) -> Result<DuplicatedBlock, AppError> {
        let (template, section) = self.section_in(store, template_type, section_id).await?;
        let Some(original) = find_block_in_tree(&section.blocks, block_id) else {
            return Ok(DuplicatedBlock {
                section: ResolvedSection::from(&section),
                copy: None,
            });
        };

        let copy = duplicate_block(original);
        let schema = self.theme(store)?.section_schema(&section.section_type)?;
        let tree = add_block_to_tree(
            &section.blocks,
            copy.clone(),
            Some(block_id),
            Placement::After,
        );
        check_block_limits(schema, &tree)?;

        let section = self
            .write_blocks(
                store,
                &template,
                section,
                tree,
                NewCustomization::block(
                    CustomizationOp::Add,
                    section_id,
                    &copy.id,
                    json!({ "duplicateOf": block_id, "block": copy }),
                ),
            )
            .await?;
        Ok(DuplicatedBlock {
            section,
            copy: Some(copy),
        })
    }

    // ==================== HELPERS ====================

    /// The section, provided it belongs to this store's template.
    async fn section_in(
        &self,
        store: &Store,
        template_type: &str,
        section_id: &str,
    ) -> Result<(Template, SectionInstance), AppError> {
        let template = self.ensure_template(store, template_type).await?;
        match self.repo.get_section(section_id).await? {
            Some(section) if section.template_id == template.id => Ok((template, section)),
            _ => Err(AppError::not_found("Section", section_id)),
        }
    }

    async fn write_blocks(
        &self,
        store: &Store,
        template: &Template,
        mut section: SectionInstance,
        tree: Vec<BlockNode>,
        change: NewCustomization,
    ) -> Result<ResolvedSection, AppError> {
        section.blocks = self.repo.replace_blocks(&section.id, &tree).await?;
        self.record(store, template, change).await?;
        Ok(ResolvedSection::from(&section))
    }

    async fn record(
        &self,
        store: &Store,
        template: &Template,
        change: NewCustomization,
    ) -> Result<(), AppError> {
        self.repo
            .append_customization(&store.id, &template.id, &change)
            .await
    }
}

/// Validate blocks about to enter a section: well-formed, of an allowed type
/// when they land at the top level, and not reusing any id already in the
/// section.
fn check_new_blocks(
    schema: &SectionSchema,
    existing: &[BlockNode],
    incoming: &[BlockNode],
    top_level: bool,
) -> Result<(), AppError> {
    let mut seen: HashSet<&str> = flatten_blocks(existing)
        .into_iter()
        .map(|b| b.id.as_str())
        .collect();

    for block in incoming {
        validate_block(block)?;
        if top_level
            && !schema.block_types.is_empty()
            && !schema.block_types.contains(&block.kind)
        {
            return Err(AppError::Validation(format!(
                "Section type '{}' does not accept '{}' blocks",
                schema.name, block.kind
            )));
        }
        for node in flatten_blocks(std::slice::from_ref(block)) {
            if !seen.insert(node.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "Block id {} is already used in this section",
                    node.id
                )));
            }
        }
    }
    Ok(())
}

fn check_block_limits(schema: &SectionSchema, top_level: &[BlockNode]) -> Result<(), AppError> {
    match schema.max_blocks {
        Some(max) if top_level.len() > max => Err(AppError::Validation(format!(
            "Section type '{}' allows at most {} blocks",
            schema.name, max
        ))),
        _ => Ok(()),
    }
}
