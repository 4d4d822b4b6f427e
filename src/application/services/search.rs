use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{
    decode_cursor, ports::VectorStore, Embedding, SearchFilter, SearchPage, SearchQuery, UserId,
};

use super::{EmbeddingQueues, PersonalizationService, QueryEmbedder, SiteVectorService};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub user_id: Option<UserId>,
    pub filter: SearchFilter,
    pub cursor: Option<String>,
    /// Overrides the configured page size.
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Which vector ranked a result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    Query,
    Personalized,
    Site,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub page: SearchPage,
    pub source: RankingSource,
    /// Set when a failure forced a weaker ranking or an empty page.
    pub degraded: bool,
}

impl SearchResults {
    fn empty() -> Self {
        Self {
            page: SearchPage::default(),
            source: RankingSource::None,
            degraded: true,
        }
    }
}

/// Similarity search that never fails the caller: every embedding or vector-store failure
/// degrades to a weaker ranking, and as a last resort to an empty page.
pub struct SearchService {
    vector_store: Arc<dyn VectorStore>,
    queries: Arc<QueryEmbedder>,
    personalization: Arc<PersonalizationService>,
    site: Arc<SiteVectorService>,
    queues: Arc<EmbeddingQueues>,
    score_threshold: f32,
    page_size: usize,
    initial_k: usize,
}

impl SearchService {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        queries: Arc<QueryEmbedder>,
        personalization: Arc<PersonalizationService>,
        site: Arc<SiteVectorService>,
        queues: Arc<EmbeddingQueues>,
    ) -> Self {
        Self {
            vector_store,
            queries,
            personalization,
            site,
            queues,
            score_threshold: 0.6,
            page_size: 20,
            initial_k: 60,
        }
    }

    pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    /// `initial_k` sizes the first page, `page_size` every page after it.
    pub fn with_paging(mut self, page_size: usize, initial_k: usize) -> Self {
        self.page_size = page_size;
        self.initial_k = initial_k;
        self
    }

    #[instrument(skip(self, request), fields(user_id = ?request.user_id))]
    pub async fn search(&self, request: &SearchRequest) -> SearchResults {
        let (vector, source, degraded) = match self.ranking_vector(request).await {
            Some(resolved) => resolved,
            None => return SearchResults::empty(),
        };

        // blank or undecodable cursors start from the top, like no cursor at all
        let first_page = request.cursor.as_deref().map(decode_cursor).unwrap_or(0) == 0;
        let limit = request.limit.unwrap_or(if first_page {
            self.initial_k
        } else {
            self.page_size
        });

        let mut query = SearchQuery::new(vector, limit)
            .with_filter(request.filter.clone())
            .with_score_threshold(self.score_threshold);
        if let Some(cursor) = &request.cursor {
            query = query.with_cursor(cursor.clone());
        }

        match self.vector_store.query(&query).await {
            Ok(page) => SearchResults {
                page,
                source,
                degraded,
            },
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed, returning empty page");
                SearchResults::empty()
            }
        }
    }

    /// The best available ranking vector, its source, and whether a failure was skipped over.
    async fn ranking_vector(
        &self,
        request: &SearchRequest,
    ) -> Option<(Embedding, RankingSource, bool)> {
        let mut degraded = false;

        if let Some(text) = request.query_text() {
            match self.queries.get_or_embed(text).await {
                Ok(vector) => return Some((vector, RankingSource::Query, false)),
                Err(e) => {
                    degraded = true;
                    tracing::warn!(error = %e, "query embedding failed, falling back");
                }
            }
        }

        if let Some(user_id) = request.user_id {
            match self.personalization.get_user_vector(user_id, false).await {
                Ok(vector) => return Some((vector, RankingSource::Personalized, degraded)),
                Err(e) if e.is_no_activity() => {
                    tracing::debug!(user_id, "no activity, using site vector");
                }
                Err(e) => {
                    degraded = true;
                    tracing::warn!(user_id, error = %e, "personalization failed, using site");
                    self.schedule_user_update(user_id);
                }
            }
        }

        match self.site.default_site_vector().await {
            Ok(vector) => Some((vector, RankingSource::Site, degraded)),
            Err(e) => {
                tracing::warn!(error = %e, "site vector unavailable, returning empty page");
                None
            }
        }
    }

    fn schedule_user_update(&self, user_id: UserId) {
        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            if let Err(e) = queues.queue_user_for_update(user_id).await {
                tracing::warn!(user_id, error = %e, "failed to queue user for recompute");
            }
        });
    }
}
