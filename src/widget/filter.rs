//! Cosmetic clean-up applied to streamed chunks before they are shown.
//!
//! The substitutions are tied to the text data-stream framing produced by the
//! relay (`0:"token"` text frames, `d:{...}` finish frames). They are kept in a
//! single ordered table per framing version so a framing change only touches
//! one table.
//!
//! Text that does not use this framing is not rejected; it comes out garbled.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub trait TextFilter: Send + Sync {
    fn version(&self) -> &'static str;
    fn apply(&self, chunk: &str) -> String;
}

struct Substitution {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Substitution {
    Substitution {
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid filter pattern {pattern}: {e}")),
        replacement,
    }
}

static DATA_STREAM_V1: Lazy<Vec<Substitution>> = Lazy::new(|| {
    vec![
        // finish / error metadata frames
        rule(r"[de]:\{.*\}", ""),
        // text frame prefixes
        rule(r#"0:""#, "\""),
        rule(r#"\\?""#, ""),
        // frame separators; content newlines arrive escaped
        rule(r"\r?\n", ""),
        rule(r"\\n", "\n"),
        rule(r"[ \t]{2,}", " "),
        // bullets
        rule(r" \*[ \t]+", "\n• "),
        rule(r"(?m)^[ \t]*\*[ \t]+", "• "),
        rule(r"\n{3,}", "\n\n"),
    ]
});

/// Filter for the `0:` / `d:` text data-stream framing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataStreamFilter;

impl TextFilter for DataStreamFilter {
    fn version(&self) -> &'static str {
        "data-stream-v1"
    }

    fn apply(&self, chunk: &str) -> String {
        DATA_STREAM_V1.iter().fold(chunk.to_string(), |text, sub| {
            sub.pattern.replace_all(&text, sub.replacement).into_owned()
        })
    }
}

/// Leaves chunks untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFilter;

impl TextFilter for PassthroughFilter {
    fn version(&self) -> &'static str {
        "passthrough"
    }

    fn apply(&self, chunk: &str) -> String {
        chunk.to_string()
    }
}

/// `raw` shows the stream as the relay sent it.
pub fn filter_for(raw: bool) -> Arc<dyn TextFilter> {
    if raw {
        Arc::new(PassthroughFilter)
    } else {
        Arc::new(DataStreamFilter)
    }
}
