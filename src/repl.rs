use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{MolangError, Result},
    engine::Engine,
};

/// Line-at-a-time shell over a standard engine. Each line gets a fresh
/// `temp`, while `variable` persists for the whole session.
pub struct Repl {
    engine: Engine,
}

impl Repl {
    pub fn new() -> Self {
        Self::with_engine(Engine::standard())
    }

    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline("molang> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.engine.eval_source(trimmed) {
                        Ok(value) => println!("{value}"),
                        Err(MolangError::Diagnostic(diag)) => {
                            eprintln!("{}", diag.render(trimmed));
                        }
                        Err(other) => eprintln!("error: {other}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

fn readline_error(err: ReadlineError) -> MolangError {
    MolangError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
