use std::path::PathBuf;

use stargazer::config::Config;
use stargazer::StargazerError;

/// Writes a validated `config::Config` to `output`, expanding a leading
/// `~` to `$HOME`. The interactive wizard that normally drives this is out
/// of scope for the engine (`spec.md` §1); this command exists so the CLI
/// surface `spec.md` §6 names has something concrete behind it.
pub fn run(output: &str) -> Result<(), StargazerError> {
    let path = expand_tilde(output);
    let config = Config::new(chrono::Utc::now());
    config.save(&path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
