//! parameter files: parsing, merging and compiling back into the document schema
//!
//! A parameter file is a mapping. Keys starting with `.` are reserved:
//! - `.INPUTS` (or `.INPUT`) declares inputs, see [Inputs::load]
//! - `.BASEPATH` roots every relative parameter name
//! - `.COMMON` holds fields merged under every parameter
//!
//! Every other key names a parameter. Its value is a string (String shorthand), a list (StringList
//! shorthand) or a mapping of parameter fields.
//!
//! ```yaml
//! .BASEPATH: /App/$(Stage)
//! .COMMON:
//!   Overwrite: true
//!
//! Db/Host: db.internal
//! Hosts: [a, b]
//! Db/Password:
//!   Input: DbPassword
//!   KeyId: alias/app
//! ```
use crate::documents::{scalar_to_string, ParameterDocuments};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::input::{InputResolver, Inputs, Prompter, ResolveOptions};
use crate::parameter::{get_names, Parameter, ParameterType, VarMode};
use crate::value::Value;
use crate::var_string::{ResolutionContext, VarString};
use indexmap::IndexMap;
use serde_yaml::Mapping;
use std::collections::BTreeSet;
use std::rc::Rc;

pub const INPUTS_KEY: &str = ".INPUTS";
const LEGACY_INPUTS_KEY: &str = ".INPUT";
pub const BASEPATH_KEY: &str = ".BASEPATH";
pub const COMMON_KEY: &str = ".COMMON";

/// Content of a single parameter file
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub inputs: Inputs,
    /// by [Parameter::key]
    pub parameters: IndexMap<String, Parameter>,
    pub base_paths: Vec<Rc<VarString>>,
}

pub fn parse(
    document: &Mapping,
    mode: VarMode,
    context: &mut ResolutionContext,
) -> Result<ParsedFile> {
    let inputs = match document
        .get(INPUTS_KEY)
        .or_else(|| document.get(LEGACY_INPUTS_KEY))
    {
        Some(section) => Inputs::load(section)?,
        None => Inputs::default(),
    };

    let common = match document.get(COMMON_KEY) {
        None | Some(serde_yaml::Value::Null) => Mapping::new(),
        Some(serde_yaml::Value::Mapping(common)) => common.clone(),
        Some(_) => return Err(Error::schema(format!("{COMMON_KEY} must be a mapping"))),
    };

    let base_path = match document.get(BASEPATH_KEY) {
        None => None,
        Some(base_path) => {
            let base_path = scalar_to_string(base_path)
                .ok_or_else(|| Error::schema(format!("{BASEPATH_KEY} must be a string")))?;
            let base_path = base_path.trim_end_matches('/');
            Some(Rc::new(if mode == VarMode::Off {
                VarString::literal(base_path)
            } else {
                VarString::load(base_path, context)
            }))
        }
    };

    let mut parameters = IndexMap::new();
    for (key, data) in document {
        let name = scalar_to_string(key)
            .ok_or_else(|| Error::schema("Parameter names must be strings"))?;
        if name.starts_with('.') {
            if ![INPUTS_KEY, LEGACY_INPUTS_KEY, BASEPATH_KEY, COMMON_KEY].contains(&name.as_str()) {
                tracing::warn!(key = %name, "ignoring unknown reserved key");
            }
            continue;
        }

        let mut fields = Mapping::new();
        fields.insert("Name".into(), name.clone().into());
        for (field, value) in &common {
            fields.insert(field.clone(), value.clone());
        }

        match data {
            serde_yaml::Value::Mapping(data) => {
                for (field, value) in data {
                    fields.insert(field.clone(), value.clone());
                }
            }
            serde_yaml::Value::Sequence(_) => {
                fields.insert("Type".into(), ParameterType::StringList.as_str().into());
                fields.insert("Value".into(), data.clone());
            }
            serde_yaml::Value::Null => {}
            scalar => {
                fields.insert("Type".into(), ParameterType::String.as_str().into());
                fields.insert("Value".into(), scalar.clone());
            }
        }

        let parameter = Parameter::load(&fields, mode, base_path.clone(), false, context)?;
        tracing::trace!(parameter = %parameter.key(), "parameter parsed");
        parameters.insert(parameter.key(), parameter);
    }

    Ok(ParsedFile {
        inputs,
        parameters,
        base_paths: base_path.into_iter().collect(),
    })
}

/// Parameters of all loaded files
#[derive(Debug, Default)]
pub struct ParameterSet {
    pub inputs: Inputs,
    pub parameters: IndexMap<String, Parameter>,
    pub base_paths: Vec<Rc<VarString>>,
}

impl ParameterSet {
    /// Parse every document and merge the results
    ///
    /// Inputs are merged with conflict checks, parameters of later documents replace earlier ones with the
    /// same key.
    pub fn load(
        documents: &ParameterDocuments,
        inputs: Inputs,
        mode: VarMode,
        context: &mut ResolutionContext,
    ) -> Result<Self> {
        let mut _self = ParameterSet {
            inputs,
            ..Default::default()
        };

        for (source, document) in documents.iter() {
            match source {
                Some(path) => tracing::info!(path=%path.display(), "loading parameters"),
                None => tracing::info!("loading parameters"),
            }

            let parsed = parse(document, mode, context)?;
            _self.inputs.merge(parsed.inputs)?;
            for (key, parameter) in parsed.parameters {
                if _self.parameters.contains_key(&key) {
                    tracing::debug!(parameter = %key, "replacing parameter of an earlier file");
                }
                _self.parameters.insert(key, parameter);
            }
            _self.base_paths.extend(parsed.base_paths);
        }

        Ok(_self)
    }

    /// Bind every referenced variable, prompting where needed
    ///
    /// Must run before any name or value is read.
    pub fn resolve_inputs(
        &mut self,
        context: &mut ResolutionContext,
        options: ResolveOptions,
        prompter: &mut dyn Prompter,
        environment: Rc<dyn Environment>,
    ) -> Result<()> {
        tracing::info!("processing inputs");
        let inputs = std::mem::take(&mut self.inputs);
        let mut resolver = InputResolver::new(inputs, options, prompter, environment);
        context.resolve(|name| resolver.resolve(name))
    }

    /// Absolute names of all enabled parameters
    pub fn names(&self, context: &ResolutionContext) -> Result<BTreeSet<String>> {
        get_names(self.parameters.values(), context)
    }

    /// Resolved base paths without duplicates, in file order
    pub fn base_paths(&self, context: &ResolutionContext) -> Result<Vec<String>> {
        let mut base_paths: Vec<String> = vec![];
        for base_path in &self.base_paths {
            let base_path = base_path.dump(context, true)?;
            if !base_paths.contains(&base_path) {
                base_paths.push(base_path);
            }
        }
        Ok(base_paths)
    }
}

/// Render parameters back into the document schema
///
/// With a `base_path` names under it are written relative to it. Secrets are written as `EncryptedValue`
/// (ciphertext), everything else with its resolved value. Fields that are absent are left out and
/// parameters without extra fields use the shorthand forms.
pub fn compile<'a>(
    parameters: impl IntoIterator<Item = &'a Parameter>,
    base_path: Option<&str>,
    ignore_disabled: bool,
    context: &ResolutionContext,
) -> Result<Value> {
    let mut document = Value::object();
    if let Some(base_path) = base_path {
        document.insert(BASEPATH_KEY, base_path);
    }

    for parameter in parameters {
        let disabled = parameter.is_disabled(context)?;
        if disabled && ignore_disabled {
            continue;
        }

        let full_name = parameter.name(context)?;
        let name = match base_path {
            Some(base_path) => full_name
                .strip_prefix(base_path)
                .and_then(|relative| relative.strip_prefix('/'))
                .unwrap_or(&full_name),
            None => &full_name,
        };

        let encrypted = parameter.is_secure() && parameter.is_encrypted();
        let value = parameter.value(context, !encrypted)?;
        let key_id = parameter.key_id(context)?;
        let allowed_pattern = parameter.allowed_pattern(context)?;

        let shorthand = !disabled
            && !parameter.is_secure()
            && allowed_pattern.is_none()
            && parameter.description().is_none();

        let data = match (shorthand, parameter.kind(), value) {
            (true, ParameterType::String, Some(value)) => Value::String(value),
            (true, ParameterType::StringList, Some(value)) => split_list(&value),
            (_, kind, value) => {
                let mut data = Value::object();
                data.insert("Type", kind.as_str());
                match value {
                    Some(value) if encrypted => data.insert("EncryptedValue", value),
                    Some(value) if kind == ParameterType::StringList => {
                        data.insert("Value", split_list(&value))
                    }
                    Some(value) => data.insert("Value", value),
                    None => {}
                }
                data.insert_some("KeyId", key_id);
                data.insert_some("AllowedPattern", allowed_pattern);
                data.insert_some("Description", parameter.description());
                if disabled {
                    data.insert("Disable", true);
                }
                data
            }
        };

        document.insert(name, data);
    }

    Ok(document)
}

fn split_list(value: &str) -> Value {
    value.split(',').collect::<Vec<_>>().into()
}
