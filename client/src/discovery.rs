//! Open match discovery.
//!
//! Discovery keeps the last good listing of joinable matches. A poll is
//! tagged with a generation when it starts; clearing the listing (leaving
//! the lobby, switching accounts) bumps the generation so a poll that
//! completes afterwards is dropped.

use tracing::{debug, warn};
use trix_types::{Address, MatchId, OpenMatch};

use crate::Result;

/// Matches the local account may join: everything except its own.
pub fn visible_matches(all: Vec<OpenMatch>, local: &Address) -> Vec<OpenMatch> {
    all.into_iter()
        .filter(|open| &open.player1 != local)
        .collect()
}

#[derive(Debug, Default)]
pub struct Discovery {
    matches: Vec<OpenMatch>,
    generation: u64,
    in_flight: bool,
}

impl Discovery {
    /// Start a poll. Returns `None` if one is already outstanding.
    pub fn begin_poll(&mut self) -> Option<u64> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.generation)
    }

    /// Record a poll result. Returns whether the listing changed.
    pub fn finish_poll(
        &mut self,
        generation: u64,
        result: Result<Vec<OpenMatch>>,
        local: &Address,
    ) -> bool {
        if generation != self.generation {
            debug!(generation, "discarding stale discovery result");
            return false;
        }
        self.in_flight = false;
        match result {
            Ok(all) => {
                let visible = visible_matches(all, local);
                if visible == self.matches {
                    return false;
                }
                self.matches = visible;
                true
            }
            Err(err) => {
                warn!(?err, "failed to fetch open matches");
                false
            }
        }
    }

    pub fn matches(&self) -> &[OpenMatch] {
        &self.matches
    }

    pub fn find(&self, match_id: MatchId) -> Option<&OpenMatch> {
        self.matches.iter().find(|open| open.match_id == match_id)
    }

    /// Forget the listing and invalidate any outstanding poll.
    pub fn clear(&mut self) {
        self.matches.clear();
        self.generation += 1;
        self.in_flight = false;
    }
}
