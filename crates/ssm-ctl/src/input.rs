//! operator supplied values for `$(Name)` variables
//!
//! Inputs are declared in the `.INPUTS` section of parameter files or created from `--input` /
//! `--secure-input` flags. During resolution [InputResolver] turns each referenced name into a
//! [Binding], prompting for values that are still missing.
use crate::crypto::Encryptor;
use crate::documents::scalar_to_string;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::parameter::ParameterType;
use crate::var_string::{Binding, Cached};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(String),
    List(Vec<String>),
    /// Secret that is already encrypted
    Ciphertext(String),
}

impl InputValue {
    fn from_yaml(value: &serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::Sequence(items) => Some(InputValue::List(
                items.iter().filter_map(scalar_to_string).collect(),
            )),
            other => scalar_to_string(other).map(InputValue::Text),
        }
    }
}

#[derive(Debug, derive_new::new)]
pub struct Input {
    pub name: String,
    pub kind: ParameterType,
    #[new(default)]
    pub pattern: Option<String>,
    #[new(default)]
    pub description: Option<String>,
    #[new(default)]
    pub default: Option<InputValue>,
    #[new(default)]
    value: Option<InputValue>,
    #[new(default)]
    plaintext: Cached<String>,
    /// ciphertext per key id
    #[new(default)]
    ciphertexts: RefCell<BTreeMap<String, String>>,
}

impl Input {
    pub fn value_is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Set an explicit value
    ///
    /// Values of SecureString inputs count as ciphertext unless `encrypted` is `Some(false)`.
    pub fn set_value(&mut self, value: impl Into<String>, encrypted: Option<bool>) {
        let value = value.into();
        self.value = Some(
            if self.kind == ParameterType::SecureString && encrypted != Some(false) {
                InputValue::Ciphertext(value)
            } else {
                InputValue::Text(value)
            },
        );
    }

    pub fn set_list(&mut self, values: Vec<String>) {
        self.value = Some(InputValue::List(values));
    }

    fn given(&self) -> Result<&InputValue> {
        self.value
            .as_ref()
            .ok_or_else(|| Error::input(format!("Input {} not given", self.name)))
    }

    /// Value as substituted into templates
    ///
    /// Lists are joined with `,`. Encrypted secrets yield their plaintext when `decrypt` is set and their
    /// ciphertext otherwise.
    pub fn value(&self, crypto: &dyn Encryptor, decrypt: bool) -> Result<String> {
        match self.given()? {
            InputValue::Text(_) if self.kind == ParameterType::SecureString && !decrypt => {
                Err(Error::input(format!(
                    "Input {} holds a plaintext secret and can only be used decrypted",
                    self.name
                )))
            }
            InputValue::Text(text) => Ok(text.clone()),
            InputValue::List(items) => Ok(items.join(",")),
            InputValue::Ciphertext(_) if decrypt => self.plaintext(crypto),
            InputValue::Ciphertext(ciphertext) => Ok(ciphertext.clone()),
        }
    }

    /// Plaintext value, decrypting at most once
    pub fn plaintext(&self, crypto: &dyn Encryptor) -> Result<String> {
        self.plaintext
            .get_or_try_resolve(&self.name, || match self.given()? {
                InputValue::Ciphertext(ciphertext) => {
                    tracing::debug!(input = %self.name, "decrypting input");
                    crypto.decrypt(ciphertext, None)
                }
                InputValue::Text(text) => Ok(text.clone()),
                InputValue::List(items) => Ok(items.join(",")),
            })
    }

    /// Ciphertext under `key_id`, encrypting the plaintext when the input was not given encrypted
    pub fn ciphertext(&self, crypto: &dyn Encryptor, key_id: &str) -> Result<String> {
        if let InputValue::Ciphertext(ciphertext) = self.given()? {
            return Ok(ciphertext.clone());
        }

        if let Some(ciphertext) = self.ciphertexts.borrow().get(key_id) {
            return Ok(ciphertext.clone());
        }

        let ciphertext = crypto.encrypt(&self.plaintext(crypto)?, key_id)?;
        self.ciphertexts
            .borrow_mut()
            .insert(key_id.to_string(), ciphertext.clone());
        Ok(ciphertext)
    }

    pub fn set_value_from_prompt(
        &mut self,
        prompter: &mut dyn Prompter,
        echo: Option<bool>,
    ) -> Result<()> {
        let value = match self.kind {
            ParameterType::String => {
                InputValue::Text(self.prompt_for_string(prompter, echo.unwrap_or(true))?)
            }
            ParameterType::SecureString => {
                InputValue::Text(self.prompt_for_string(prompter, echo.unwrap_or(false))?)
            }
            ParameterType::StringList => {
                InputValue::List(self.prompt_for_list(prompter, echo.unwrap_or(true))?)
            }
        };
        self.value = Some(value);
        Ok(())
    }

    fn prompt_message(&self) -> String {
        let mut message = format!("Enter {} [{}]", self.name, self.kind);
        if let Some(description) = &self.description {
            message.push_str(&format!(" ({description})"));
        }
        message
    }

    fn validate(&self, value: &str) -> Result<()> {
        let Some(pattern) = &self.pattern else {
            return Ok(());
        };

        let regex = regex::Regex::new(pattern).map_err(|e| {
            Error::schema(format!("Invalid pattern {pattern} for input {}: {e}", self.name))
        })?;
        if !regex.is_match(value) {
            return Err(Error::input(format!(
                "Invalid input for {}: does not match {pattern}",
                self.name
            )));
        }
        Ok(())
    }

    fn prompt_for_string(&self, prompter: &mut dyn Prompter, echo: bool) -> Result<String> {
        let mut value = prompter.prompt(&format!("{}: ", self.prompt_message()), echo)?;
        if value.is_empty() {
            if let Some(InputValue::Text(default)) = &self.default {
                value = default.clone();
            }
        }
        self.validate(&value)?;
        Ok(value)
    }

    fn prompt_for_list(&self, prompter: &mut dyn Prompter, echo: bool) -> Result<Vec<String>> {
        let first = prompter.prompt(
            &format!(
                "{} (comma separated, or one per line ending with a blank line): ",
                self.prompt_message()
            ),
            echo,
        )?;

        let values = if first.is_empty() {
            match &self.default {
                Some(InputValue::List(items)) => items.clone(),
                Some(InputValue::Text(text)) => text.split(',').map(str::to_string).collect(),
                _ => vec![],
            }
        } else if first.contains(',') {
            first.split(',').map(str::to_string).collect()
        } else {
            let mut values = vec![first];
            loop {
                let entry = prompter.prompt("> ", echo)?;
                if entry.is_empty() {
                    break;
                }
                values.push(entry);
            }
            values
        };

        self.validate(&values.join(","))?;
        Ok(values)
    }
}

/// Declared inputs by name
#[derive(Debug, Default)]
pub struct Inputs {
    inputs: IndexMap<String, Input>,
}

impl Inputs {
    /// Build declarations from an `.INPUTS` section
    ///
    /// Entries are either a bare type (`Name: String`) or a mapping with `Type`, `Pattern`,
    /// `Description` and `Default`.
    pub fn load(section: &serde_yaml::Value) -> Result<Self> {
        let mut inputs = Inputs::default();

        let serde_yaml::Value::Mapping(section) = section else {
            if section.is_null() {
                return Ok(inputs);
            }
            return Err(Error::schema("Inputs must be a mapping"));
        };

        for (name, data) in section {
            let name = scalar_to_string(name)
                .ok_or_else(|| Error::schema("Input names must be strings"))?;

            let input = match data {
                serde_yaml::Value::String(kind) => Input::new(name, kind.parse()?),
                serde_yaml::Value::Null => Input::new(name, ParameterType::String),
                serde_yaml::Value::Mapping(fields) => {
                    let kind = match fields.get("Type").and_then(scalar_to_string) {
                        Some(kind) => kind.parse()?,
                        None => ParameterType::String,
                    };
                    if kind == ParameterType::SecureString && fields.contains_key("Default") {
                        return Err(Error::schema(format!(
                            "Defaults are not allowed for SecureString input {name}"
                        )));
                    }

                    let mut input = Input::new(name, kind);
                    input.pattern = fields
                        .get("Pattern")
                        .and_then(scalar_to_string)
                        .filter(|pattern| !pattern.is_empty());
                    input.description = fields.get("Description").and_then(scalar_to_string);
                    input.default = fields.get("Default").and_then(InputValue::from_yaml);
                    input
                }
                _ => {
                    return Err(Error::schema(format!(
                        "Input {name} must be a type name or a mapping"
                    )))
                }
            };

            inputs.insert(input);
        }

        Ok(inputs)
    }

    pub fn insert(&mut self, input: Input) {
        self.inputs.insert(input.name.clone(), input);
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.inputs.get(name)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn take(&mut self, name: &str) -> Option<Input> {
        self.inputs.shift_remove(name)
    }

    /// Merge `other` into `self`
    ///
    /// Types must agree. A pattern or description present on only one side is kept; two different
    /// non-empty patterns conflict. An empty pattern counts as absent.
    pub fn merge(&mut self, other: Inputs) -> Result<()> {
        for (name, incoming) in other.inputs {
            let Some(existing) = self.inputs.get_mut(&name) else {
                self.inputs.insert(name, incoming);
                continue;
            };

            if existing.kind != incoming.kind {
                return Err(Error::TypeConflict(name));
            }

            existing.pattern = match (existing.pattern.take(), incoming.pattern) {
                (Some(current), Some(pattern))
                    if !current.is_empty() && !pattern.is_empty() && current != pattern =>
                {
                    return Err(Error::PatternConflict(name));
                }
                (current, pattern) => current
                    .into_iter()
                    .chain(pattern)
                    .find(|pattern| !pattern.is_empty()),
            };

            if existing.description.is_none() {
                existing.description = incoming.description;
            }
            if existing.default.is_none() {
                existing.default = incoming.default;
            }
        }

        Ok(())
    }

    /// Apply a value given on the command line
    ///
    /// Undeclared names become String (or SecureString for `secure`) inputs. Only `secure` values may
    /// be given for SecureString inputs and only plain ones for everything else.
    pub fn set_value(&mut self, name: &str, value: &str, secure: bool) -> Result<()> {
        let kind = if secure {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };

        let input = self
            .inputs
            .entry(name.to_string())
            .or_insert_with(|| Input::new(name.to_string(), kind));

        if secure != (input.kind == ParameterType::SecureString) {
            return Err(Error::TypeConflict(name.to_string()));
        }

        match input.kind {
            ParameterType::StringList => {
                input.set_list(value.split(',').map(str::to_string).collect())
            }
            _ => input.set_value(value, None),
        }
        Ok(())
    }
}

/// Whether and how missing inputs are asked for
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub prompt: bool,
    /// Overrides the per-type default (SecureString hidden, everything else visible)
    pub echo: Option<bool>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            prompt: true,
            echo: None,
        }
    }
}

/// Binds variable names to inputs
pub struct InputResolver<'p> {
    inputs: Inputs,
    options: ResolveOptions,
    prompter: &'p mut dyn Prompter,
    environment: Rc<dyn Environment>,
}

impl<'p> InputResolver<'p> {
    pub fn new(
        inputs: Inputs,
        options: ResolveOptions,
        prompter: &'p mut dyn Prompter,
        environment: Rc<dyn Environment>,
    ) -> Self {
        Self {
            inputs,
            options,
            prompter,
            environment,
        }
    }

    pub fn resolve(&mut self, name: &str) -> Result<Binding> {
        let not_given = || Error::input(format!("Input {name} not given"));

        let mut input = match self.inputs.take(name) {
            Some(input) => input,
            None => match name {
                "Region" => {
                    let environment = self.environment.clone();
                    return Ok(Binding::computed(move || environment.region()));
                }
                "Account" => {
                    let environment = self.environment.clone();
                    return Ok(Binding::computed(move || environment.account()));
                }
                _ if !self.options.prompt => return Err(not_given()),
                _ => Input::new(name.to_string(), ParameterType::String),
            },
        };

        if !input.value_is_set() {
            if !self.options.prompt {
                return Err(not_given());
            }
            input.set_value_from_prompt(self.prompter, self.options.echo)?;
        }

        Ok(Binding::Input(Rc::new(input)))
    }
}

/// Interactive source of input values
pub trait Prompter {
    /// Show `message` and read one line (without line terminator)
    fn prompt(&mut self, message: &str, echo: bool) -> std::io::Result<String>;
}

/// [Prompter] reading from the terminal; hidden input uses raw mode
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&mut self, message: &str, echo: bool) -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{message}")?;
        stderr.flush()?;

        if !echo {
            match read_hidden_line() {
                Err(e) if e.kind() != std::io::ErrorKind::Interrupted => {
                    tracing::warn!(error=%e, "unable to hide input, reading it visibly");
                }
                result => return result,
            }
        }

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn read_hidden_line() -> std::io::Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

    struct RawModeGuard;

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }

    crossterm::terminal::enable_raw_mode()?;
    let guard = RawModeGuard;

    let mut line = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };

        if kind == KeyEventKind::Release {
            continue;
        }

        match code {
            KeyCode::Enter => break,
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "input interrupted",
                ));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }

    drop(guard);
    eprintln!();
    Ok(line)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::environment::StaticEnvironment;
    use crate::var_string::ResolutionContext;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedPrompter {
        answers: VecDeque<&'static str>,
        prompts: Vec<(String, bool)>,
    }

    impl ScriptedPrompter {
        fn answering(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn prompt(&mut self, message: &str, echo: bool) -> std::io::Result<String> {
            self.prompts.push((message.to_string(), echo));
            Ok(self.answers.pop_front().unwrap_or_default().to_string())
        }
    }

    /// "encrypts" by wrapping and counts decryptions
    #[derive(Default)]
    struct CountingCrypto {
        decryptions: Cell<usize>,
    }

    impl Encryptor for CountingCrypto {
        fn encrypt(&self, plaintext: &str, key_id: &str) -> Result<String> {
            Ok(format!("enc[{key_id}]({plaintext})"))
        }

        fn decrypt(&self, ciphertext: &str, _key_id: Option<&str>) -> Result<String> {
            self.decryptions.set(self.decryptions.get() + 1);
            Ok(format!("dec({ciphertext})"))
        }
    }

    fn inputs(yaml: &str) -> Result<Inputs> {
        Inputs::load(&serde_yaml::from_str(yaml).unwrap())
    }

    fn environment() -> Rc<dyn Environment> {
        Rc::new(StaticEnvironment::new(
            Some("us-east-1".into()),
            Some("123456789012".into()),
        ))
    }

    #[test]
    fn load_declarations() {
        let inputs = inputs(
            r"
            Plain: String
            WithPattern:
              Type: String
              Pattern: ^value$
              Description: The description
            List:
              Type: StringList
              Default: [a, b]
            Secret:
              Type: SecureString
            ",
        )
        .unwrap();

        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs.get("Plain").unwrap().kind, ParameterType::String);
        let with_pattern = inputs.get("WithPattern").unwrap();
        assert_eq!(with_pattern.pattern.as_deref(), Some("^value$"));
        assert_eq!(with_pattern.description.as_deref(), Some("The description"));
        assert_eq!(
            inputs.get("List").unwrap().default,
            Some(InputValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            inputs.get("Secret").unwrap().kind,
            ParameterType::SecureString
        );
    }

    #[test]
    fn secure_default_is_rejected() {
        let result = inputs(
            r"
            Secret:
              Type: SecureString
              Default: nope
            ",
        );
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(inputs("Bad: Integer"), Err(Error::Schema(_))));
    }

    #[test]
    fn merge_fills_missing_pattern() {
        let mut target = inputs("Name: String").unwrap();
        let source = inputs(
            r"
            Name:
              Type: String
              Pattern: ^\w+$
              Description: from the second file
            ",
        )
        .unwrap();

        target.merge(source).unwrap();

        assert_eq!(target.len(), 1);
        let input = target.get("Name").unwrap();
        assert_eq!(input.pattern.as_deref(), Some(r"^\w+$"));
        assert_eq!(input.description.as_deref(), Some("from the second file"));
    }

    #[test]
    fn merge_ignores_empty_pattern() {
        let mut target = inputs("Name: {Type: String, Pattern: ''}").unwrap();
        assert_eq!(target.get("Name").unwrap().pattern, None);

        target
            .merge(inputs("Name: {Type: String, Pattern: '^a$'}").unwrap())
            .unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target.get("Name").unwrap().pattern.as_deref(), Some("^a$"));

        target
            .merge(inputs("Name: {Type: String, Pattern: ''}").unwrap())
            .unwrap();
        assert_eq!(target.get("Name").unwrap().pattern.as_deref(), Some("^a$"));
    }

    #[test]
    fn merge_type_conflict() {
        let mut target = inputs("Name: String").unwrap();
        let result = target.merge(inputs("Name: StringList").unwrap());
        assert!(matches!(result, Err(Error::TypeConflict(name)) if name == "Name"));
    }

    #[test]
    fn merge_pattern_conflict() {
        let mut target = inputs("Name: {Type: String, Pattern: a}").unwrap();
        let result = target.merge(inputs("Name: {Type: String, Pattern: b}").unwrap());
        assert!(matches!(result, Err(Error::PatternConflict(name)) if name == "Name"));
    }

    #[test]
    fn undeclared_without_prompt_fails() {
        let mut prompter = ScriptedPrompter::default();
        let options = ResolveOptions {
            prompt: false,
            echo: None,
        };
        let mut resolver =
            InputResolver::new(Inputs::default(), options, &mut prompter, environment());

        let error = resolver.resolve("Missing").unwrap_err();
        assert!(matches!(&error, Error::Input(_)));
        assert_eq!(error.to_string(), "Input Missing not given");
    }

    #[test]
    fn region_and_account_are_computed() {
        let mut prompter = ScriptedPrompter::default();
        let options = ResolveOptions {
            prompt: false,
            echo: None,
        };
        let mut resolver =
            InputResolver::new(Inputs::default(), options, &mut prompter, environment());
        let context = ResolutionContext::default();

        let region = resolver.resolve("Region").unwrap();
        let account = resolver.resolve("Account").unwrap();

        assert_eq!(region.value(&context, true).unwrap(), "us-east-1");
        assert_eq!(account.value(&context, true).unwrap(), "123456789012");
        assert!(prompter.prompts.is_empty());
    }

    #[test]
    fn undeclared_with_prompt_asks_for_string() {
        let mut prompter = ScriptedPrompter::answering(&["typed"]);
        let context = ResolutionContext::default();

        let binding = {
            let mut resolver = InputResolver::new(
                Inputs::default(),
                ResolveOptions::default(),
                &mut prompter,
                environment(),
            );
            resolver.resolve("Stage").unwrap()
        };

        assert_eq!(binding.value(&context, true).unwrap(), "typed");
        assert_eq!(
            prompter.prompts,
            vec![("Enter Stage [String]: ".to_string(), true)]
        );
    }

    #[test]
    fn secure_prompt_hides_input_by_default() {
        let mut prompter = ScriptedPrompter::answering(&["s3cret", "visible"]);
        let declared = inputs("Secret: SecureString\nOther: String").unwrap();

        {
            let mut resolver = InputResolver::new(
                declared,
                ResolveOptions::default(),
                &mut prompter,
                environment(),
            );
            resolver.resolve("Secret").unwrap();
            resolver.resolve("Other").unwrap();
        }

        let echoes: Vec<bool> = prompter.prompts.iter().map(|(_, echo)| *echo).collect();
        assert_eq!(echoes, vec![false, true]);
    }

    #[test]
    fn echo_override() {
        let mut prompter = ScriptedPrompter::answering(&["s3cret"]);
        let options = ResolveOptions {
            prompt: true,
            echo: Some(true),
        };
        let mut resolver = InputResolver::new(
            inputs("Secret: SecureString").unwrap(),
            options,
            &mut prompter,
            environment(),
        );
        resolver.resolve("Secret").unwrap();
        drop(resolver);

        assert_eq!(prompter.prompts[0].1, true);
    }

    #[test]
    fn declared_without_value_and_prompt_disabled_fails() {
        let mut prompter = ScriptedPrompter::default();
        let options = ResolveOptions {
            prompt: false,
            echo: None,
        };
        let mut resolver = InputResolver::new(
            inputs("Name: String").unwrap(),
            options,
            &mut prompter,
            environment(),
        );
        assert!(matches!(resolver.resolve("Name"), Err(Error::Input(_))));
    }

    #[test]
    fn prompted_value_is_validated() {
        let mut prompter = ScriptedPrompter::answering(&["not-matching"]);
        let mut resolver = InputResolver::new(
            inputs("Name: {Type: String, Pattern: '^\\d+$'}").unwrap(),
            ResolveOptions::default(),
            &mut prompter,
            environment(),
        );
        assert!(matches!(resolver.resolve("Name"), Err(Error::Input(_))));
    }

    #[test]
    fn list_prompt_one_per_line() {
        let mut input = Input::new("Hosts".into(), ParameterType::StringList);
        let mut prompter = ScriptedPrompter::answering(&["a", "b", ""]);
        input.set_value_from_prompt(&mut prompter, None).unwrap();

        assert_eq!(input.value.unwrap(), InputValue::List(vec!["a".into(), "b".into()]));
        assert_eq!(prompter.prompts.len(), 3);
    }

    #[test]
    fn list_prompt_comma_separated() {
        let mut input = Input::new("Hosts".into(), ParameterType::StringList);
        let mut prompter = ScriptedPrompter::answering(&["a,b,c"]);
        input.set_value_from_prompt(&mut prompter, None).unwrap();

        assert_eq!(
            input.value.unwrap(),
            InputValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(prompter.prompts.len(), 1);
    }

    #[test]
    fn list_prompt_blank_uses_default() {
        let mut input = Input::new("Hosts".into(), ParameterType::StringList);
        input.default = Some(InputValue::List(vec!["x".into()]));
        input
            .set_value_from_prompt(&mut ScriptedPrompter::answering(&[""]), None)
            .unwrap();
        assert_eq!(input.value.unwrap(), InputValue::List(vec!["x".into()]));

        let mut input = Input::new("Hosts".into(), ParameterType::StringList);
        input
            .set_value_from_prompt(&mut ScriptedPrompter::answering(&[""]), None)
            .unwrap();
        assert_eq!(input.value.unwrap(), InputValue::List(vec![]));
    }

    #[test]
    fn secure_value_is_ciphertext_by_default() {
        let crypto = CountingCrypto::default();
        let mut input = Input::new("Secret".into(), ParameterType::SecureString);
        input.set_value("CIPHERTEXT", None);

        assert_eq!(input.value(&crypto, false).unwrap(), "CIPHERTEXT");
        assert_eq!(input.value(&crypto, true).unwrap(), "dec(CIPHERTEXT)");
        assert_eq!(input.value(&crypto, true).unwrap(), "dec(CIPHERTEXT)");
        assert_eq!(crypto.decryptions.get(), 1);
        assert_eq!(input.ciphertext(&crypto, "key").unwrap(), "CIPHERTEXT");

        let mut input = Input::new("Secret".into(), ParameterType::SecureString);
        input.set_value("plain", Some(false));
        assert_eq!(input.value(&crypto, true).unwrap(), "plain");
        assert!(input.value(&crypto, false).is_err());
        assert_eq!(input.ciphertext(&crypto, "key").unwrap(), "enc[key](plain)");
        assert_eq!(crypto.decryptions.get(), 1);
    }

    #[test]
    fn command_line_values() {
        let mut declared = inputs("Hosts: StringList\nSecret: SecureString").unwrap();

        declared.set_value("Hosts", "a,b", false).unwrap();
        declared.set_value("Secret", "CIPHER", true).unwrap();
        declared.set_value("Undeclared", "value", false).unwrap();

        assert_eq!(
            declared.get("Hosts").unwrap().value,
            Some(InputValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            declared.get("Secret").unwrap().value,
            Some(InputValue::Ciphertext("CIPHER".into()))
        );
        assert_eq!(
            declared.get("Undeclared").unwrap().kind,
            ParameterType::String
        );
        assert!(matches!(
            declared.set_value("Hosts", "x", true),
            Err(Error::TypeConflict(_))
        ));
        assert!(matches!(
            declared.set_value("Secret", "plaintext-password", false),
            Err(Error::TypeConflict(name)) if name == "Secret"
        ));
        assert_eq!(
            declared.get("Secret").unwrap().value,
            Some(InputValue::Ciphertext("CIPHER".into()))
        );
    }
}
