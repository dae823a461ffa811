//! Top-level driver: evaluates forms one at a time against a single global
//! frame and prints every result that is not Void.

use std::io::Write;

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::evaluator::{EvalConfig, Environment, Evaluator, create_global_env};

/// A global frame with the primitives installed, plus the evaluator that runs forms in it.
#[derive(Debug, Clone)]
pub struct Interpreter {
    env: Environment,
    evaluator: Evaluator,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl Interpreter {
    pub fn new(config: EvalConfig) -> Self {
        Interpreter {
            env: create_global_env(),
            evaluator: Evaluator::new(config),
        }
    }

    /// The global frame
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Evaluate one top-level form in the global frame
    pub fn eval_form(&self, form: &Value) -> Result<Value, Error> {
        debug!(%form, "evaluating top-level form");
        self.evaluator.eval(form, &self.env)
    }

    /// Evaluate one form and print its result followed by a newline, unless it is Void
    pub fn run_form<W: Write>(&self, form: &Value, out: &mut W) -> Result<(), Error> {
        let result = self.eval_form(form)?;
        if !result.is_void() {
            writeln!(out, "{result}")?;
        }
        Ok(())
    }

    /// Run forms in order, stopping at the first error
    pub fn run_forms<W: Write>(&self, forms: &[Value], out: &mut W) -> Result<(), Error> {
        for form in forms {
            self.run_form(form, out)?;
        }
        Ok(())
    }

    /// Parse all of `source`, then run it
    #[cfg(feature = "reader")]
    pub fn run_source<W: Write>(&self, source: &str, out: &mut W) -> Result<(), Error> {
        let forms = crate::scheme::parse_program(source)?;
        debug!(forms = forms.len(), "parsed program");
        self.run_forms(&forms, out)
    }
}

/// Evaluate already parsed top-level forms in a fresh global frame
pub fn interpret<W: Write>(forms: &[Value], out: &mut W) -> Result<(), Error> {
    Interpreter::default().run_forms(forms, out)
}

/// Parse and run a whole program in a fresh global frame
#[cfg(feature = "reader")]
pub fn run_program<W: Write>(source: &str, config: EvalConfig, out: &mut W) -> Result<(), Error> {
    Interpreter::new(config).run_source(source, out)
}
