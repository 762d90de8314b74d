use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanConfig {
    pub start: Option<u16>,
    pub end: Option<u16>,
    pub workers: Option<usize>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanConfig>,
}

pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("netscan.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_scan_section() {
        let cfg: Config = serde_yaml::from_str("scan:\n  end: 2048\n  format: jsonl\n").unwrap();
        let scan = cfg.scan.unwrap();
        assert_eq!(scan.end, Some(2048));
        assert_eq!(scan.format.as_deref(), Some("jsonl"));
        assert!(scan.start.is_none());
    }
}
