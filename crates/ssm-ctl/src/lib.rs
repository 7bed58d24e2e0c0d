//! # ssm-ctl - parameter store control
//!
//! Declare parameter store parameters in yaml files and reconcile them with the store.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `ssm-ctl` works internally.
//!
//! ### Parameter files
//!
//! ```yaml
//! .INPUTS:
//!   Stage: String
//!   DbPassword:
//!     Type: SecureString
//!     Description: password of the application database
//!
//! .BASEPATH: /App/$(Stage)
//!
//! .COMMON:
//!   Overwrite: true
//!
//! Db/Host: db.$(Stage).internal
//! Db/Replicas: [replica-a, replica-b]
//! Db/Password:
//!   Input: DbPassword
//!   KeyId: alias/app
//! ```
//!
//! Keys starting with `.` are reserved, everything else is a parameter. See [parameter_file] for the schema.
//!
//! ### Loading files
//!
//! A file is decoded into a yaml mapping. `ssm-ctl` can be used with multiple files: [documents::ParameterDocuments]
//! stores them in order together with their source path. At this point a file only has to be a yaml mapping to be
//! accepted.
//!
//! ### Parsing
//!
//! see [parameter_file::ParameterSet::load]
//!
//! Each document is parsed into inputs, parameters and a base path. Every string field that may contain a `$(Name)`
//! reference becomes a [var_string::VarString]; constructing one registers the names it references in the
//! [var_string::ResolutionContext] of the invocation. Which fields are templated depends on the
//! [parameter::VarMode]: `diff` and `delete` only need names, download reads data that is already resolved.
//!
//! Inputs of all documents are merged (types and patterns must agree), parameters of later documents replace those
//! of earlier ones.
//!
//! ### Resolution
//!
//! see [parameter_file::ParameterSet::resolve_inputs]
//!
//! Once all documents are parsed the context knows every referenced name. Each one is bound exactly once, in sorted
//! order, through [input::InputResolver]:
//!
//! | **name**                    | **binding**                                 |
//! |-----------------------------|---------------------------------------------|
//! | declared, value given       | the input                                   |
//! | declared, no value          | prompt (or fail with `--no-prompt`)         |
//! | `Region` / `Account`        | computed from the [environment::Environment] |
//! | anything else               | prompt for a String (or fail)               |
//!
//! ### Values
//!
//! Names and values are computed on first read and cached, see [parameter::Parameter::value]. Secrets are decrypted
//! at most once. Reading a variable that was never bound is an error, not a silent re-resolution.
//!
//! ### Output
//!
//! Actions on the resolved parameters:
//! - `push` puts them into the store through [store::SsmClient] (optionally flushing everything else below the base
//!   paths, see [diff::flush])
//! - `diff` compares their names with the store per base path, see [diff::diff_paths]
//! - `download` and `push --dry-run` render them back into the document schema ([parameter_file::compile]) as a
//!   [value::Value] which in turn gets serialized via [serde].
//!
pub mod crypto;
pub mod diff;
pub mod documents;
pub mod environment;
pub mod error;
pub mod input;
pub mod parameter;
pub mod parameter_file;
pub mod store;
pub mod value;
pub mod var_string;

pub use error::{Error, Result};
