#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("an error occurred with the database connection")]
    Database(#[from] diesel::result::Error),

    #[error("an error occurred getting a database connection")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("an error occurred with the embedded store")]
    Store(#[from] duckdb::Error),

    #[error("an error occurred parsing csv")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Parsing(#[from] ParseError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    DbLink(#[from] DbLinkError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("step failed critically: {0}")]
    Critical(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    DateFormat(#[from] chrono::ParseError),

    #[error("invalid archive: could not find {0}")]
    FileNotFound(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("element or attribute not found: {0}")]
    NotFound(String),
}

#[derive(thiserror::Error, Debug)]
pub enum XmlError {
    #[error(transparent)]
    Reader(#[from] quick_xml::Error),

    #[error(transparent)]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

/// Errors raised by the ID classifier. The classifier itself never aborts a step;
/// callers translate this into a DEBUG log under the matching category.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("invalid biosample accession: {0}")]
    InvalidBiosampleId(String),

    #[error("invalid bioproject accession: {0}")]
    InvalidBioprojectId(String),

    #[error("invalid accession: {0}")]
    InvalidAccessionId(String),
}

#[derive(thiserror::Error, Debug)]
pub enum SplitError {
    #[error("corrupt record: unmatched end tag {0}")]
    UnmatchedEndTag(String),

    #[error("no root element found in {0}")]
    MissingRoot(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DbLinkError {
    #[error("dblink store has not been finalized yet")]
    NotFinalized,

    #[error("unknown relation pair for dump: {0:?}-{1:?}")]
    UnknownPair(String, String),
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("transient error from document sink: {0}")]
    Transient(String),

    #[error("permanent error from document sink: {0}")]
    Permanent(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("cannot find source in database: {0}")]
    Source(String),

    #[error("date cache is missing or older than the current run")]
    StaleDateCache,
}
