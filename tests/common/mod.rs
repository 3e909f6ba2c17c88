#![allow(dead_code)]

use concert_etl::config::Config;
use std::collections::HashMap;
use std::path::Path;

/// Config with dummy keys, no request delay and two attempts per call.
pub fn test_config(output_dir: &Path) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("KOPIS_API_KEY", "kopis-key".to_string()),
        ("PERPLEXITY_API_KEY", "pplx-key".to_string()),
        ("GEMINI_API_KEY", "gemini-key".to_string()),
        ("MUSIXMATCH_API_KEY", "mxm-key".to_string()),
        ("REQUEST_DELAY", "0".to_string()),
        ("MAX_RETRIES", "2".to_string()),
        ("TIMEOUT", "5".to_string()),
        ("OUTPUT_DIR", output_dir.display().to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}
