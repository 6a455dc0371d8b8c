//! One lookup control's view of its relationship.
//!
//! A [`LookupSession`] ties a [`ControlConfig`] to the resolver and the query
//! builder and keeps the state a control needs between calls:
//!
//! - the resolved descriptor (resolution errors propagate)
//! - the associated records of the current source record, marked stale after
//!   every successful mutation and refetched on next access; a read that was
//!   in flight while a mutation completed is cached as stale
//! - cached search pages keyed by the search text and the values of the
//!   watched fields, dropped whenever a watched field changes
//! - a search generation counter: a search that finishes after a newer one
//!   started is discarded (`Ok(None)`)
//!
//! Record ids are normalized (trimmed, braces stripped, lowercased) before
//! they are compared or cached. Read and search failures degrade to empty
//! results and are logged at `warn`; mutation failures are always returned.

mod pending;

pub use pending::{PendingItem, PendingSelection};

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

use crate::api::DataApi;
use crate::association::{AssociationQueryBuilder, AssociationRecord, SearchPage, normalize_record_id};
use crate::config::ControlConfig;
use crate::core::{LookupError, LookupResult};
use crate::metadata::MetadataDescriptor;
use crate::resolver::RelationshipResolver;
use crate::templating::{RecordContext, extract_field_names};
use crate::watch::{FieldWatcher, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct AssociatedCache {
    source_record_id: Option<String>,
    records: Vec<AssociationRecord>,
    stale: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    descriptor: Mutex<Option<Arc<MetadataDescriptor>>>,
    associated: Mutex<Option<AssociatedCache>>,
    searches: Mutex<HashMap<String, SearchPage>>,
    search_generation: AtomicU64,
    mutation_epoch: AtomicU64,
}

impl SessionState {
    fn clear_searches(&self) {
        lock(&self.searches).clear();
    }
}

/// State and operations of one lookup control.
#[derive(Debug)]
pub struct LookupSession {
    config: ControlConfig,
    page_size: usize,
    resolver: Arc<RelationshipResolver>,
    builder: AssociationQueryBuilder,
    state: Arc<SessionState>,
}

impl LookupSession {
    /// Create a session with its own resolver.
    ///
    /// `default_page_size` applies when the control does not set a page size.
    ///
    /// # Errors
    ///
    /// [`LookupError::ConfigError`] when `config` does not validate.
    pub fn new(api: Arc<dyn DataApi>, config: ControlConfig, default_page_size: usize) -> LookupResult<Self> {
        let resolver = Arc::new(RelationshipResolver::new(Arc::clone(&api)));
        Self::with_resolver(api, resolver, config, default_page_size)
    }

    /// Create a session sharing `resolver` with other sessions.
    ///
    /// # Errors
    ///
    /// [`LookupError::ConfigError`] when `config` does not validate.
    pub fn with_resolver(
        api: Arc<dyn DataApi>,
        resolver: Arc<RelationshipResolver>,
        config: ControlConfig,
        default_page_size: usize,
    ) -> LookupResult<Self> {
        config.validate()?;
        Ok(Self {
            page_size: config.page_size_or(default_page_size),
            config,
            resolver,
            builder: AssociationQueryBuilder::new(api),
            state: Arc::new(SessionState::default()),
        })
    }

    /// The control parameters.
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Effective search page size.
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// The resolved descriptor, resolving on first use.
    ///
    /// # Errors
    ///
    /// Any resolution error; nothing is cached on failure.
    pub async fn descriptor(&self) -> LookupResult<Arc<MetadataDescriptor>> {
        if let Some(descriptor) = lock(&self.state.descriptor).clone() {
            return Ok(descriptor);
        }
        let descriptor = self.resolver.resolve(&self.config.descriptor_key()).await?;
        *lock(&self.state.descriptor) = Some(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Host-record fields whose changes invalidate cached search results:
    /// those referenced by the view template and the custom filter.
    ///
    /// # Errors
    ///
    /// Any resolution error.
    pub async fn watched_fields(&self) -> LookupResult<Vec<String>> {
        let descriptor = self.descriptor().await?;
        Ok(self.fields_of(&descriptor))
    }

    fn fields_of(&self, descriptor: &MetadataDescriptor) -> Vec<String> {
        let mut fields = extract_field_names(&descriptor.default_view.fetch_query_template);
        if let Some(filter) = &self.config.custom_filter {
            for field in extract_field_names(filter) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Search text plus the watched field values it would be expanded with.
    fn search_cache_key(&self, descriptor: &MetadataDescriptor, text: &str, record: &RecordContext) -> String {
        let watched: Map<String, Value> = self
            .fields_of(descriptor)
            .into_iter()
            .map(|field| {
                let value = record.get(&field).cloned().unwrap_or(Value::Null);
                (field, value)
            })
            .collect();
        format!("{}\n{}", text.trim().to_lowercase(), Value::Object(watched))
    }

    /// Drop cached search results whenever a watched field changes, for as
    /// long as the returned subscription lives.
    ///
    /// # Errors
    ///
    /// Any resolution error.
    pub async fn watch(&self, watcher: &FieldWatcher) -> LookupResult<Subscription> {
        let fields = self.watched_fields().await?;
        let state: Weak<SessionState> = Arc::downgrade(&self.state);
        Ok(watcher.subscribe(fields, move |change| {
            if let Some(state) = state.upgrade() {
                debug!(target: "session", "Field '{}' changed; dropping cached searches", change.field);
                state.clear_searches();
            }
        }))
    }

    /// Records associated with `source_record_id`.
    ///
    /// Served from cache unless the cache is stale or belongs to another
    /// record. A failed read, or a malformed id, degrades to an empty list.
    ///
    /// # Errors
    ///
    /// Only resolution errors.
    pub async fn associated(&self, source_record_id: Option<&str>) -> LookupResult<Vec<AssociationRecord>> {
        let descriptor = self.descriptor().await?;
        let wanted = match source_record_id.filter(|id| !id.trim().is_empty()).map(normalize_record_id) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(error)) => {
                warn!(target: "session", "Listing associated records failed: {}", error);
                return Ok(Vec::new());
            }
        };
        {
            let cache = lock(&self.state.associated);
            if let Some(cache) = cache.as_ref() {
                if !cache.stale && cache.source_record_id == wanted {
                    return Ok(cache.records.clone());
                }
            }
        }

        let epoch = self.state.mutation_epoch.load(Ordering::SeqCst);
        match self.builder.list_associated(&descriptor, wanted.as_deref()).await {
            Ok(records) => {
                let stale = self.state.mutation_epoch.load(Ordering::SeqCst) != epoch;
                if stale {
                    debug!(target: "session", "Associated records changed while listing; caching as stale");
                }
                *lock(&self.state.associated) = Some(AssociatedCache {
                    source_record_id: wanted,
                    records: records.clone(),
                    stale,
                });
                Ok(records)
            }
            Err(error) => {
                warn!(target: "session", "Listing associated records failed: {}", error);
                Ok(Vec::new())
            }
        }
    }

    /// Mark the associated-records cache stale.
    pub fn mark_stale(&self) {
        self.state.mutation_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = lock(&self.state.associated).as_mut() {
            cache.stale = true;
        }
    }

    /// Whether the next [`associated`](Self::associated) call refetches.
    pub fn is_stale(&self) -> bool {
        lock(&self.state.associated).as_ref().is_none_or(|cache| cache.stale)
    }

    /// Search candidate targets.
    ///
    /// Returns `Ok(None)` when a newer search started before this one
    /// finished. A failed search degrades to an empty page.
    ///
    /// # Errors
    ///
    /// Only resolution errors.
    pub async fn search(&self, text: &str, record: &RecordContext) -> LookupResult<Option<SearchPage>> {
        let generation = self.state.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let descriptor = self.descriptor().await?;

        let cache_key = self.search_cache_key(&descriptor, text, record);
        if let Some(page) = lock(&self.state.searches).get(&cache_key).cloned() {
            return Ok(Some(page));
        }

        let request = self.config.search_request(text, self.page_size, record.clone());
        let result = self.builder.search(&descriptor, &request).await;
        if self.state.search_generation.load(Ordering::SeqCst) != generation {
            debug!(target: "session", "Discarding superseded search for '{}'", text);
            return Ok(None);
        }

        match result {
            Ok(page) => {
                lock(&self.state.searches).insert(cache_key, page.clone());
                Ok(Some(page))
            }
            Err(error) => {
                warn!(target: "session", "Search for '{}' failed: {}", text, error);
                Ok(Some(SearchPage::empty()))
            }
        }
    }

    /// Associate `target_id` with the saved host record.
    ///
    /// # Errors
    ///
    /// Resolution errors and [`LookupError::AssociationError`].
    pub async fn associate(&self, source_record_id: &str, target_id: &str) -> LookupResult<Option<String>> {
        let descriptor = self.descriptor().await?;
        let link_row = self.builder.associate(&descriptor, source_record_id, target_id).await?;
        self.mark_stale();
        Ok(link_row)
    }

    /// Remove one association by the identifier kind of the active shape.
    ///
    /// # Errors
    ///
    /// Resolution errors and [`LookupError::AssociationError`].
    pub async fn disassociate(&self, source_record_id: &str, link_or_target_id: &str) -> LookupResult<()> {
        let descriptor = self.descriptor().await?;
        self.builder.disassociate(&descriptor, source_record_id, link_or_target_id).await?;
        self.mark_stale();
        Ok(())
    }

    /// Remove the association behind a listed record, picking the right
    /// identifier for the shape.
    ///
    /// # Errors
    ///
    /// Resolution errors and [`LookupError::AssociationError`], including
    /// when the record carries no identifier of the required kind.
    pub async fn remove(&self, source_record_id: &str, record: &AssociationRecord) -> LookupResult<()> {
        let descriptor = self.descriptor().await?;
        let kind = descriptor.shape.link_id_kind();
        let id = record.link_id(kind).ok_or_else(|| {
            LookupError::association("disassociate", format!("record '{}' carries no {kind}", record.target_id))
        })?;
        self.disassociate(source_record_id, id).await
    }

    /// Associate every pending target with the now saved host record.
    ///
    /// Targets already associated are skipped. Committed and skipped items
    /// leave `pending`; on the first failure the remaining items stay so the
    /// commit can be retried. Returns the number of associations created.
    ///
    /// # Errors
    ///
    /// Resolution errors, [`LookupError::InvalidRecordId`] for a malformed
    /// source or pending id, and [`LookupError::AssociationError`].
    pub async fn commit(&self, pending: &mut PendingSelection, source_record_id: &str) -> LookupResult<usize> {
        let descriptor = self.descriptor().await?;
        let source_record_id = normalize_record_id(source_record_id)?;
        let mut linked: Vec<String> = self
            .builder
            .list_associated(&descriptor, Some(&source_record_id))
            .await
            .map_err(|e| LookupError::association("associate", e.to_string()))?
            .into_iter()
            .filter_map(|record| normalize_record_id(&record.target_id).ok())
            .collect();

        let mut created = 0;
        let items = pending.items().to_vec();
        for item in items {
            let target_id = normalize_record_id(&item.target_id)?;
            if linked.contains(&target_id) {
                debug!(target: "session", "Skipping already associated {}", target_id);
            } else {
                self.builder.associate(&descriptor, &source_record_id, &target_id).await?;
                self.mark_stale();
                created += 1;
                linked.push(target_id);
            }
            pending.remove(&item.target_id);
        }
        Ok(created)
    }
}
