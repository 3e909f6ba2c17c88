pub mod gemini;
pub mod kopis;
pub mod llm;
pub mod musixmatch;
pub mod perplexity;
pub mod retry;

pub use kopis::{is_visit_concert, ConcertSource, KopisClient, KopisDetail, PerformanceState};
pub use llm::{build_llm_client, LlmClient};
pub use musixmatch::{LyricsProvider, MusixmatchClient, TrackCandidate};
