use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed table {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("cannot build airport automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),
}
