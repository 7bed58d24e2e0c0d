//! collection of parameter documents (decoded yaml mapping and path to source file)
//!
//! [ParameterDocuments] keeps documents in insertion order. Later documents override parameters of earlier ones,
//! so the order is significant.
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct ParameterDocuments {
    documents: Vec<(Source, Mapping)>,
}

impl ParameterDocuments {
    /// Inserts a decoded document
    ///
    /// An empty document (`null`) counts as an empty mapping.
    pub fn insert(
        &mut self,
        document: Value,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        let path = path.into();
        let mapping = match document {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => return Err(LoadError::NotAMapping(describe(&path))),
        };

        self.documents.push((path, mapping));
        Ok(())
    }

    /// Parses and inserts a yaml (or json) document
    pub fn insert_str(
        &mut self,
        document: &str,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        self.insert(serde_yaml::from_str(document)?, path)
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceDocument> {
        self.documents
            .iter()
            .map(|(source, document)| (source, document))
    }

    pub fn source_count(&self) -> usize {
        self.documents.len()
    }
}

impl ParameterDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        self.insert_str(&file_contents, Some(file_path))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Document {0} must be a mapping")]
    NotAMapping(String),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml file")]
    YamlParseFailed(#[from] serde_yaml::Error),
}

impl From<Mapping> for ParameterDocuments {
    fn from(value: Mapping) -> Self {
        ParameterDocuments {
            documents: vec![(None, value)],
        }
    }
}

fn describe(source: &Source) -> String {
    match source {
        Some(path) => path.display().to_string(),
        None => "<inline>".to_string(),
    }
}

/// Text of a scalar yaml value; `None` for null, sequences and mappings
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Utility macro to create [ParameterDocuments]
///
/// Create from a single document
/// ```
/// # use ssm_ctl::parameter_documents;
/// parameter_documents!("/App/Name: value");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use ssm_ctl::parameter_documents;
/// parameter_documents! {
///   "one.yaml" => "/App/One: 1",
///   "two.yaml" => "/App/Two: 2"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use ssm_ctl::parameter_documents;
/// parameter_documents!("- not\n- a mapping");
/// ```
#[macro_export]
macro_rules! parameter_documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::documents::ParameterDocuments::default();
        docs.insert_str($expr, None).expect("document must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::documents::ParameterDocuments::default();
        $(
            docs.insert_str($expr, Some(::std::path::PathBuf::from($source))).expect("document must parse");
        )+
        docs
    }};
}

pub type Source = Option<PathBuf>;
pub type SourceDocument<'a> = (&'a Source, &'a Mapping);
