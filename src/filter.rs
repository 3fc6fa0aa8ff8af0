//! Classification of enumerated messages into forwardable, duplicate, filtered or unusable.

use regex::{Regex, RegexBuilder};

use crate::dedup::DedupCache;
use crate::platform::Message;
use crate::types::{ContentSignature, TaskConfig};
use crate::{Error, Result};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Which file rule rejected a message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterReason {
    /// File name ends in a forbidden extension
    Extension,
    /// File name contains a forbidden keyword
    Keyword,
    /// File size is outside the configured bounds
    Size,
}

/// Outcome of classifying one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Forward it; `record` is a new signature to persist to the durable dedup store
    Accept {
        /// Signature recorded in the cache for this message, if any
        record: Option<ContentSignature>,
    },
    /// Same content was already forwarded
    Duplicate,
    /// Rejected by a file rule
    Filtered(FilterReason),
    /// Empty or service message
    Unusable,
}

/// Compiled per-task filter rules
#[derive(Debug)]
pub struct FilterPipeline {
    extension: Option<Regex>,
    keyword: Option<Regex>,
    min_size_mb: f64,
    max_size_mb: f64,
    skip_duplicates: bool,
}

impl FilterPipeline {
    /// Compile the rules of a task configuration
    pub fn from_config(config: &TaskConfig) -> Result<Self> {
        if config.min_size_mb < 0.0 || config.max_size_mb < 0.0 {
            return Err(Error::Config {
                message: "size bounds must not be negative".to_string(),
                key: Some("min_size_mb".to_string()),
            });
        }
        if config.max_size_mb > 0.0 && config.min_size_mb > config.max_size_mb {
            return Err(Error::Config {
                message: format!(
                    "minimum size {} MB exceeds maximum size {} MB",
                    config.min_size_mb, config.max_size_mb
                ),
                key: Some("max_size_mb".to_string()),
            });
        }

        Ok(Self {
            extension: extension_pattern(&config.extensions)?,
            keyword: keyword_pattern(&config.keywords)?,
            min_size_mb: config.min_size_mb,
            max_size_mb: config.max_size_mb,
            skip_duplicates: config.skip_duplicates,
        })
    }

    /// Classify a message, recording its signature in `dedup` when accepted
    pub fn classify(&self, message: &Message, dedup: &mut DedupCache) -> Verdict {
        if message.is_unusable() {
            return Verdict::Unusable;
        }

        let Some(media) = &message.media else {
            return Verdict::Accept { record: None };
        };

        if let Some(name) = media.file_name.as_deref() {
            if self.extension.as_ref().is_some_and(|re| re.is_match(name)) {
                return Verdict::Filtered(FilterReason::Extension);
            }
            if self.keyword.as_ref().is_some_and(|re| re.is_match(name)) {
                return Verdict::Filtered(FilterReason::Keyword);
            }
        }

        if !size_in_range(media.file_size, self.min_size_mb, self.max_size_mb) {
            return Verdict::Filtered(FilterReason::Size);
        }

        if dedup.contains(&media.signature) {
            return Verdict::Duplicate;
        }
        if self.skip_duplicates {
            dedup.insert(media.signature.clone());
            return Verdict::Accept {
                record: Some(media.signature.clone()),
            };
        }

        Verdict::Accept { record: None }
    }
}

/// Whether a size in bytes passes `[min_mb, max_mb]`; a zero bound is open
pub fn size_in_range(bytes: u64, min_mb: f64, max_mb: f64) -> bool {
    if min_mb == 0.0 && max_mb == 0.0 {
        return true;
    }
    let size_mb = bytes as f64 / BYTES_PER_MB;
    (min_mb == 0.0 || size_mb >= min_mb) && (max_mb == 0.0 || size_mb <= max_mb)
}

fn extension_pattern(extensions: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("(?:{ext})"))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }

    RegexBuilder::new(&format!(r"\.(?:{})$", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| Error::Config {
            message: format!("invalid extension pattern: {e}"),
            key: Some("extensions".to_string()),
        })
}

fn keyword_pattern(keywords: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|kw| kw.trim())
        .filter(|kw| !kw.is_empty())
        .map(|kw| format!("(?:{kw})"))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }

    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| Error::Config {
            message: format!("invalid keyword pattern: {e}"),
            key: Some("keywords".to_string()),
        })
}
