//! End-to-end handling of chat commands.
//!
//! A message is acknowledged immediately; the slow part (counting,
//! fetching, ranking, rendering) runs afterwards as a [`Dispatch::job`] and
//! delivers its replies through a [`Responder`].

mod builder;
mod command;

pub use builder::PipelineBuilder;
pub use command::{validate_filter, Command, MessageEvent};

use crate::config::DigestConfig;
use crate::counter::{FrequencyCounter, ScanBudget};
use crate::digest::DigestBuilder;
use crate::error::{PulseError, Result};
use crate::fetcher::BulkMetadataFetcher;
use crate::identifier::{find_raw_identifier, PaperId};
use crate::ranker;
use crate::sources::{MetadataSource, SearchSource};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A message posted back into the thread of the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub thread_ts: String,
}

/// Delivers follow-up replies.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn say(&self, reply: Reply) -> Result<()>;
}

/// Acknowledgment to return now, plus the work that produces the replies.
pub struct Dispatch {
    pub ack: Reply,
    pub job: BoxFuture<'static, ()>,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").field("ack", &self.ack).finish()
    }
}

/// Counting, fetching, ranking and rendering wired together.
pub struct Pipeline {
    counter: FrequencyCounter,
    fetcher: BulkMetadataFetcher,
    digest: DigestBuilder,
    budget: ScanBudget,
    chunk_size: usize,
    top_n: usize,
    default_filter: String,
}

impl Pipeline {
    pub fn builder(
        search: Arc<dyn SearchSource>,
        metadata: Arc<dyn MetadataSource>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(search, metadata)
    }

    /// Digest for the first paper linked in `text`.
    pub async fn lookup_paper(&self, text: &str, user: Option<&str>) -> Result<String> {
        let raw_id = find_raw_identifier(text).ok_or_else(|| PulseError::NotFound {
            what: "arXiv URL".to_string(),
        })?;
        self.lookup_id(raw_id, user).await
    }

    /// Digest for one paper id, with or without a version suffix.
    ///
    /// The record is fetched for the id as given; posts are counted for
    /// its canonical form.
    pub async fn lookup_id(&self, raw_id: &str, user: Option<&str>) -> Result<String> {
        let records = self
            .fetcher
            .fetch(&[raw_id.to_string()], "", self.chunk_size)
            .await;
        let Some(mut record) = records.into_iter().next() else {
            return Err(PulseError::NotFound {
                what: raw_id.to_string(),
            });
        };

        let paper_id = PaperId::canonicalize(raw_id);
        let query = format!(
            "\"arxiv.org/abs/{id}\" OR \"arxiv.org/pdf/{id}.pdf\"",
            id = paper_id
        );
        let table = self.counter.count(&query, self.budget).await;
        ranker::enrich(&table, &mut record);

        Ok(self.digest.render(&record, user).await)
    }

    /// Digests of the most linked papers matching `filter`, best first.
    ///
    /// Without a filter the default category filter applies.
    pub async fn top_papers(&self, filter: Option<&str>, user: Option<&str>) -> Result<Vec<String>> {
        if let Some(filter) = filter {
            validate_filter(filter)?;
        }
        let filter = filter.unwrap_or(&self.default_filter);

        let table = self
            .counter
            .count(DigestConfig::ALL_PAPERS_QUERY, self.budget)
            .await;
        if table.is_empty() {
            return Err(PulseError::NoResults {
                service: "twitter".to_string(),
            });
        }

        let ids: Vec<String> = table.ids().map(|id| id.as_str().to_string()).collect();
        let records = self.fetcher.fetch(&ids, filter, self.chunk_size).await;
        if records.is_empty() {
            return Err(PulseError::NoResults {
                service: "arXiv".to_string(),
            });
        }

        let top = ranker::rank_top(&table, records, self.top_n);
        let mut digests = Vec::with_capacity(top.len());
        for record in &top {
            digests.push(self.digest.render(record, user).await);
        }
        Ok(digests)
    }

    /// Run `command` and return the reply texts, errors rendered for the user.
    pub async fn run(&self, command: &Command, user: Option<&str>) -> Vec<String> {
        let start = Instant::now();
        let result = match command {
            Command::LookupPaper { raw_id } => self
                .lookup_id(raw_id, user)
                .await
                .map(|digest| vec![digest]),
            Command::TopPapers { filter } => self.top_papers(filter.as_deref(), user).await,
        };
        info!("Handled {:?} in {:.3?}", command, start.elapsed());

        match result {
            Ok(texts) => texts,
            Err(e) => {
                match &e {
                    PulseError::NotFound { .. }
                    | PulseError::NoResults { .. }
                    | PulseError::Validation { .. } => debug!("Command produced no digest: {}", e),
                    _ => warn!("Command failed: {}", e),
                }
                vec![e.user_message()]
            }
        }
    }

    /// Acknowledge `event` and prepare the job that answers it.
    ///
    /// Returns `None` for bot messages and messages without a command.
    pub fn handle(
        self: &Arc<Self>,
        event: MessageEvent,
        responder: Arc<dyn Responder>,
    ) -> Option<Dispatch> {
        if !event.is_from_user() {
            debug!("Ignoring bot message {}", event.ts);
            return None;
        }
        let command = Command::parse(&event.text)?;

        let ack = Reply {
            text: command.ack_text().to_string(),
            thread_ts: event.ts.clone(),
        };

        let pipeline = Arc::clone(self);
        let job = async move {
            let texts = pipeline.run(&command, event.user.as_deref()).await;
            for text in texts {
                let reply = Reply {
                    text,
                    thread_ts: event.ts.clone(),
                };
                if let Err(e) = responder.say(reply).await {
                    warn!("Failed to deliver reply in thread {}: {}", event.ts, e);
                }
            }
        }
        .boxed();

        Some(Dispatch { ack, job })
    }
}
