//! Reduces a list of geocoding candidates to the single accepted one

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheFormat, CacheStore, CallArgs, Memoizer, WriteSchedule};
use crate::geocode::client::CandidateSource;
use crate::geocode::error::{GeocodeError, PromptError};
use crate::geocode::models::{AddressQuery, Confidence, GeocodeCandidate, MatchStatus, ResolvedGeocode};
use crate::geocode::prompt::{Selection, SelectionPrompt};

/// Upper bound on replacement addresses entered during one manual selection
pub const MAX_REPLACEMENTS: usize = 5;

struct CandidateFilter {
    message: &'static str,
    keep: fn(&GeocodeCandidate) -> bool,
}

// Applied in order. A filter only takes effect when it narrows the set without emptying it.
const FILTERS: [CandidateFilter; 4] = [
    CandidateFilter {
        message: "Dropping non exact matches.",
        keep: |c: &GeocodeCandidate| c.confidence() == Some(Confidence::Exact),
    },
    CandidateFilter {
        message: "Dropping matches with postcode mismatch.",
        keep: |c: &GeocodeCandidate| c.postcode_match() == Some(MatchStatus::Matched),
    },
    CandidateFilter {
        message: "Dropping low confidence matches.",
        keep: |c: &GeocodeCandidate| c.confidence() != Some(Confidence::Low),
    },
    // Keeps everything that is not "high": high-confidence matches are the ones dropped.
    CandidateFilter {
        message: "Dropping high confidence matches.",
        keep: |c: &GeocodeCandidate| c.confidence() != Some(Confidence::High),
    },
];

fn apply_filter(candidates: Vec<GeocodeCandidate>, filter: &CandidateFilter) -> Vec<GeocodeCandidate> {
    let kept: Vec<GeocodeCandidate> = candidates.iter().filter(|c| (filter.keep)(c)).cloned().collect();
    if !kept.is_empty() && kept.len() < candidates.len() {
        info!("{}", filter.message);
        kept
    } else {
        candidates
    }
}

/// Run the confidence filter cascade. Never grows the set and never empties it.
pub fn narrow_candidates(mut candidates: Vec<GeocodeCandidate>) -> Vec<GeocodeCandidate> {
    for filter in &FILTERS {
        if candidates.len() <= 1 {
            break;
        }
        candidates = apply_filter(candidates, filter);
    }
    candidates
}

pub struct Resolver {
    source: Arc<dyn CandidateSource>,
    selections: Arc<Memoizer<GeocodeCandidate>>,
    prompt: Arc<dyn SelectionPrompt>,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        selections: Arc<Memoizer<GeocodeCandidate>>,
        prompt: Arc<dyn SelectionPrompt>,
    ) -> Self {
        Self {
            source,
            selections,
            prompt,
        }
    }

    /// Cache of manual choices, keyed by address text and comment
    pub fn selection_cache(
        dir: impl Into<PathBuf>,
        format: CacheFormat,
        schedule: WriteSchedule,
    ) -> Memoizer<GeocodeCandidate> {
        Memoizer::new("manual-selection", CacheStore::new(dir, format), schedule)
    }

    pub fn selections(&self) -> &Arc<Memoizer<GeocodeCandidate>> {
        &self.selections
    }

    /// Geocode `query` and resolve the response to one candidate
    pub async fn geocode_address(
        &self,
        query: &AddressQuery,
        comment: Option<&str>,
        interactive: bool,
    ) -> Result<ResolvedGeocode, GeocodeError> {
        let query = query.normalized();
        let candidates = self.source.fetch_candidates(&query).await?;
        let candidate = self.resolve(&query, candidates, comment, interactive).await?;
        Ok(ResolvedGeocode { query, candidate })
    }

    /// Reduce `candidates` for `address` to exactly one.
    ///
    /// With `interactive` set, a set the filters cannot narrow is shown to the
    /// prompt; the answer is remembered per address and comment.
    pub async fn resolve(
        &self,
        address: &AddressQuery,
        candidates: Vec<GeocodeCandidate>,
        comment: Option<&str>,
        interactive: bool,
    ) -> Result<GeocodeCandidate, GeocodeError> {
        if candidates.is_empty() {
            return Err(GeocodeError::NoCandidates(address.to_string()));
        }

        let mut candidates = narrow_candidates(candidates);
        if candidates.len() > 1 && interactive {
            let args = self.selection_args(address, comment);
            return self
                .selections
                .call(&args, || self.choose_manually(address, candidates, comment))
                .await;
        }

        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            remaining => Err(GeocodeError::Ambiguous {
                address: address.to_string(),
                remaining,
            }),
        }
    }

    /// Forget a remembered manual choice
    pub async fn forget_selection(
        &self,
        address: &AddressQuery,
        comment: Option<&str>,
    ) -> Result<(), GeocodeError> {
        let args = self.selection_args(address, comment);
        self.selections.invalidate(&args).await?;
        Ok(())
    }

    fn selection_args(&self, address: &AddressQuery, comment: Option<&str>) -> CallArgs {
        CallArgs::new().arg(address).arg(comment.unwrap_or(""))
    }

    /// Ask the prompt until one candidate is chosen.
    ///
    /// A replacement address is geocoded and narrowed like a fresh lookup. If
    /// it is still ambiguous, the prompt continues on its candidates and the
    /// final answer is remembered for the replacement address too.
    async fn choose_manually(
        &self,
        address: &AddressQuery,
        mut candidates: Vec<GeocodeCandidate>,
        comment: Option<&str>,
    ) -> Result<GeocodeCandidate, GeocodeError> {
        let outer = self.selections.key_for(&self.selection_args(address, comment));
        let mut current = address.to_string();
        let mut replaced: Vec<CallArgs> = Vec::new();
        let mut replacements = 0;

        while candidates.len() > 1 {
            let ambiguous = |remaining| GeocodeError::Ambiguous {
                address: address.to_string(),
                remaining,
            };

            match self.prompt.choose(&current, comment, &candidates).await {
                Ok(Selection::Index(index)) if index < candidates.len() => {
                    debug!("Manual selection {} for {}", index, current);
                    let chosen = candidates.swap_remove(index);
                    self.remember_replacements(&replaced, &chosen).await?;
                    return Ok(chosen);
                }
                Ok(Selection::Index(index)) => {
                    warn!("Selection {} is out of range (0..{})", index, candidates.len());
                }
                Ok(Selection::Replace(replacement)) => {
                    if replacements >= MAX_REPLACEMENTS {
                        warn!("Giving up on {} after {} replacement addresses", address, replacements);
                        return Err(ambiguous(candidates.len()));
                    }
                    replacements += 1;

                    let replacement = replacement.normalized();
                    let found = match self.source.fetch_candidates(&replacement).await {
                        Ok(found) => found,
                        Err(e @ (GeocodeError::Authentication(_) | GeocodeError::Cache(_))) => {
                            return Err(e)
                        }
                        Err(e) => {
                            warn!("Failed to geocode replacement {}: {}", replacement, e);
                            continue;
                        }
                    };
                    if found.is_empty() {
                        warn!("Failed to find results for {}", replacement);
                        continue;
                    }

                    let narrowed = narrow_candidates(found);
                    if narrowed.len() > 1 {
                        let args = self.selection_args(&replacement, None);
                        let key = self.selections.key_for(&args);
                        if let Some(chosen) = self.selections.store().get(&key).await? {
                            debug!("Using remembered selection for {}", replacement);
                            self.remember_replacements(&replaced, &chosen).await?;
                            return Ok(chosen);
                        }
                        // The outer key is recorded by the caller
                        if key != outer {
                            replaced.push(args);
                        }
                    }
                    candidates = narrowed;
                    current = replacement.to_string();
                }
                Err(PromptError::Invalid(reason)) => warn!("Error: {}", reason),
                Err(e) => {
                    warn!("Manual selection for {} aborted: {}", address, e);
                    return Err(ambiguous(candidates.len()));
                }
            }
        }

        let chosen = candidates
            .pop()
            .ok_or_else(|| GeocodeError::NoCandidates(current))?;
        self.remember_replacements(&replaced, &chosen).await?;
        Ok(chosen)
    }

    async fn remember_replacements(
        &self,
        replaced: &[CallArgs],
        chosen: &GeocodeCandidate,
    ) -> Result<(), GeocodeError> {
        for args in replaced {
            self.selections
                .call(args, || async { Ok::<_, GeocodeError>(chosen.clone()) })
                .await?;
        }
        Ok(())
    }
}
