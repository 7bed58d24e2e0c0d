//! Snapshot tests
//!
//! Loads each *.yaml file in /tests/ individually, resolves it with fixed inputs and compares if the
//! compiled document changes.

use ssm_ctl::crypto::Encryptor;
use ssm_ctl::documents::ParameterDocuments;
use ssm_ctl::environment::StaticEnvironment;
use ssm_ctl::input::{Inputs, Prompter, ResolveOptions};
use ssm_ctl::parameter::VarMode;
use ssm_ctl::parameter_file::{compile, ParameterSet};
use ssm_ctl::var_string::ResolutionContext;
use ssm_ctl::Error;
use std::rc::Rc;

/// `KEY|PLAINTEXT`, readable in snapshots
struct Sealing;

impl Encryptor for Sealing {
    fn encrypt(&self, plaintext: &str, key_id: &str) -> ssm_ctl::Result<String> {
        Ok(format!("{key_id}|{plaintext}"))
    }

    fn decrypt(&self, ciphertext: &str, _key_id: Option<&str>) -> ssm_ctl::Result<String> {
        ciphertext
            .split_once('|')
            .map(|(_, plaintext)| plaintext.to_string())
            .ok_or_else(|| Error::Crypto(format!("not sealed: {ciphertext}")))
    }
}

struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt(&mut self, message: &str, _echo: bool) -> std::io::Result<String> {
        panic!("unexpected prompt {message}")
    }
}

const INPUTS: [(&str, &str, bool); 3] = [
    ("Stage", "dev", false),
    ("Replicas", "a,b", false),
    ("DbPassword", "alias/app|hunter2", true),
];

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("SSM_CTL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("*.yaml", |path| {
        let mut documents = ParameterDocuments::default();
        documents.load_file(path).expect("must be a yaml mapping");

        let mut context = ResolutionContext::new(Rc::new(Sealing));
        let mut parameters =
            ParameterSet::load(&documents, Inputs::default(), VarMode::All, &mut context)
                .expect("must be a valid parameter file");
        for (name, value, secure) in INPUTS {
            parameters.inputs.set_value(name, value, secure).unwrap();
        }

        let options = ResolveOptions {
            prompt: false,
            echo: None,
        };
        let environment = StaticEnvironment::new(
            Some("eu-west-1".to_string()),
            Some("123456789012".to_string()),
        );
        parameters
            .resolve_inputs(&mut context, options, &mut NoPrompt, Rc::new(environment))
            .expect("inputs resolve");

        let document = compile(parameters.parameters.values(), None, false, &context)
            .expect("valid parameters");
        let rendered = serde_json::to_string_pretty(&document).unwrap();

        insta::assert_snapshot!(rendered);
    });
}
