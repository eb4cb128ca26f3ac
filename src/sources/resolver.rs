//! Track resolution.
//!
//! A query is classified, the classification selects an ordered list of
//! [`Strategy`] values, and the strategies run in order until one produces a
//! track. Only a catalog outage moves resolution on to the next strategy;
//! every other failure is final.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classify::{classify, QueryKind};
use super::{CatalogProvider, Candidate, Requester, SearchProvider, Track};
use crate::error::ResolutionError;

/// Un paso de resolución
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Consulta de una URL al proveedor principal
    DirectLookup,
    /// Metadata del catálogo y luego búsqueda de "<artista> <título>"
    CatalogThenSearch,
    /// Búsqueda con el texto original
    TextSearch,
}

impl Strategy {
    /// Estrategias a probar, en orden
    pub fn plan(kind: &QueryKind) -> &'static [Strategy] {
        match kind {
            QueryKind::Direct(_) => &[Strategy::DirectLookup],
            QueryKind::Catalog(_) => &[Strategy::CatalogThenSearch, Strategy::TextSearch],
            QueryKind::Search(_) => &[Strategy::TextSearch],
        }
    }
}

/// Resultado de una estrategia fallida
enum StepError {
    /// Catálogo caído; puede correr la siguiente estrategia
    CatalogUnavailable(ResolutionError),
    /// La resolución falla con este error
    Fatal(ResolutionError),
}

impl From<ResolutionError> for StepError {
    fn from(err: ResolutionError) -> Self {
        StepError::Fatal(err)
    }
}

/// Convierte consultas en tracks reproducibles
pub struct TrackResolver {
    primary: Arc<dyn SearchProvider>,
    catalog: Option<Arc<dyn CatalogProvider>>,
    search_limit: usize,
}

impl TrackResolver {
    pub fn new(
        primary: Arc<dyn SearchProvider>,
        catalog: Option<Arc<dyn CatalogProvider>>,
        search_limit: usize,
    ) -> Self {
        Self {
            primary,
            catalog,
            search_limit: search_limit.max(1),
        }
    }

    /// Resuelve `query` en un track completo o falla
    pub async fn resolve(&self, query: &str, requester: Requester) -> Result<Track, ResolutionError> {
        let kind = classify(query)?;
        debug!("🔎 Consulta '{}' clasificada como {:?}", query, kind);

        let mut last_error = None;
        for strategy in Strategy::plan(&kind) {
            match self.run(*strategy, &kind, query, requester.clone()).await {
                Ok(track) => {
                    info!(
                        "✅ Resuelto '{}' -> {} [{}] vía {:?}",
                        query,
                        track.title(),
                        track.id(),
                        strategy
                    );
                    return Ok(track);
                }
                Err(StepError::CatalogUnavailable(err)) => {
                    warn!("🔄 Catálogo no disponible ({}), usando búsqueda directa", err);
                    last_error = Some(err);
                }
                Err(StepError::Fatal(err)) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| ResolutionError::NotFound(query.to_string())))
    }

    async fn run(
        &self,
        strategy: Strategy,
        kind: &QueryKind,
        raw_query: &str,
        requester: Requester,
    ) -> Result<Track, StepError> {
        match (strategy, kind) {
            (Strategy::DirectLookup, QueryKind::Direct(url)) => {
                let candidates = self.primary.lookup(url).await?;
                let candidate = first(candidates, url)?;
                Ok(Track::from_candidate(candidate, requester))
            }
            (Strategy::CatalogThenSearch, QueryKind::Catalog(id)) => {
                let catalog = self.catalog.as_ref().ok_or_else(|| {
                    StepError::CatalogUnavailable(ResolutionError::unavailable(
                        "catalog",
                        "no configurado",
                    ))
                })?;

                let meta = match catalog.track(id).await {
                    Ok(meta) => meta,
                    Err(err @ ResolutionError::ProviderUnavailable { .. }) => {
                        return Err(StepError::CatalogUnavailable(err))
                    }
                    Err(err) => return Err(StepError::Fatal(err)),
                };

                let text = meta.search_text();
                let candidates = self.primary.search(&text, self.search_limit).await?;
                let playable = first(candidates, &text)?;
                Ok(Track::from_catalog(meta, playable, requester))
            }
            (Strategy::TextSearch, QueryKind::Search(text)) => {
                let candidates = self.primary.search(text, self.search_limit).await?;
                let candidate = first(candidates, text)?;
                Ok(Track::from_candidate(candidate, requester))
            }
            // Fallback tras caída del catálogo: se busca el texto crudo
            (Strategy::TextSearch, _) => {
                let text = raw_query.trim();
                let candidates = self.primary.search(text, self.search_limit).await?;
                let candidate = first(candidates, text)?;
                Ok(Track::from_candidate(candidate, requester))
            }
            (strategy, kind) => Err(StepError::Fatal(ResolutionError::InvalidReference(format!(
                "estrategia {:?} no aplica a {:?}",
                strategy, kind
            )))),
        }
    }
}

fn first(candidates: Vec<Candidate>, query: &str) -> Result<Candidate, ResolutionError> {
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ResolutionError::NotFound(query.to_string()))
}
