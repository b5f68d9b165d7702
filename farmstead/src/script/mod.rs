//! Boot-time command sequences.
//!
//! A [`CommandSequence`] accumulates shell operations for the first boot of an
//! instance. Operations keep insertion order and are never deduplicated.
//! The sequence is consumed by a single [`CommandSequence::render`] call that
//! seals it. Appending afterwards is a caller error since the rendered image
//! is already fixed.
//!
//! ## Rendered layout
//!
//! ```text
//! #!/bin/bash
//! set +e
//! (                      ← main sequence, fail-fast
//! set -xeuo pipefail
//! ...
//! )
//! exitCode=$?
//! ...                    ← on-exit operations, run on success and failure
//! exit $exitCode
//! ```

mod sensitive;

pub use sensitive::SensitiveBlock;

use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use std::fmt;
use std::sync::Arc;

/// Shell variable holding the exit status of the main sequence.
pub const EXIT_CODE_VAR: &str = "exitCode";

/// A command whose text is only known at render time.
pub trait LazyCommand: Send + Sync {
    fn render(&self) -> FarmsteadResult<String>;

    /// Undo whatever `render` froze once the enclosing render has failed.
    fn release(&self) {}
}

/// One operation in a sequence.
#[derive(Clone)]
pub enum ScriptItem {
    Line(String),
    Lazy(Arc<dyn LazyCommand>),
}

impl ScriptItem {
    fn render(&self) -> FarmsteadResult<String> {
        match self {
            ScriptItem::Line(line) => Ok(line.clone()),
            ScriptItem::Lazy(cmd) => cmd.render(),
        }
    }

    pub(crate) fn release(&self) {
        if let ScriptItem::Lazy(cmd) = self {
            cmd.release();
        }
    }
}

impl fmt::Debug for ScriptItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptItem::Line(line) => f.debug_tuple("Line").field(line).finish(),
            ScriptItem::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandSequence {
    commands: Vec<ScriptItem>,
    on_exit: Vec<ScriptItem>,
    sealed: bool,
}

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> FarmsteadResult<()> {
        if self.sealed {
            return Err(FarmsteadError::InvalidState(
                "command sequence already rendered; no further commands can be added".into(),
            ));
        }
        Ok(())
    }

    pub fn add_commands<I, S>(&mut self, commands: I) -> FarmsteadResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        self.commands
            .extend(commands.into_iter().map(|c| ScriptItem::Line(c.into())));
        Ok(())
    }

    pub fn add_lazy(&mut self, command: Arc<dyn LazyCommand>) -> FarmsteadResult<()> {
        self.ensure_open()?;
        self.commands.push(ScriptItem::Lazy(command));
        Ok(())
    }

    pub fn add_items<I>(&mut self, items: I) -> FarmsteadResult<()>
    where
        I: IntoIterator<Item = ScriptItem>,
    {
        self.ensure_open()?;
        self.commands.extend(items);
        Ok(())
    }

    /// Append operations that run after the main sequence, whatever its outcome.
    pub fn add_on_exit_commands<I, S>(&mut self, commands: I) -> FarmsteadResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        self.on_exit
            .extend(commands.into_iter().map(|c| ScriptItem::Line(c.into())));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.on_exit.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn release(&self) {
        self.commands
            .iter()
            .chain(&self.on_exit)
            .for_each(ScriptItem::release);
    }

    /// Render the sequence into one boot script and seal it.
    ///
    /// Lazy commands are evaluated here, exactly once. A failing lazy command
    /// leaves the sequence unsealed and every lazy command released, so the
    /// caller can correct and retry.
    pub fn render(&mut self) -> FarmsteadResult<String> {
        self.ensure_open()?;

        let rendered = self
            .commands
            .iter()
            .map(ScriptItem::render)
            .collect::<FarmsteadResult<Vec<_>>>()
            .and_then(|main| {
                let on_exit = self
                    .on_exit
                    .iter()
                    .map(ScriptItem::render)
                    .collect::<FarmsteadResult<Vec<_>>>()?;
                Ok((main, on_exit))
            });
        let (main, on_exit) = match rendered {
            Ok(lines) => lines,
            Err(e) => {
                self.release();
                return Err(e);
            }
        };

        self.sealed = true;

        let mut script = String::from("#!/bin/bash\nset +e\n(\nset -xeuo pipefail\n");
        for line in &main {
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(")\n");
        script.push_str(&format!("{}=$?\n", EXIT_CODE_VAR));
        for line in &on_exit {
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(&format!("exit ${}\n", EXIT_CODE_VAR));

        tracing::trace!(
            commands = main.len(),
            on_exit = on_exit.len(),
            bytes = script.len(),
            "Rendered command sequence"
        );
        Ok(script)
    }
}

/// Quote `value` for safe use as one shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Counter(Mutex<u32>);

    impl LazyCommand for Counter {
        fn render(&self) -> FarmsteadResult<String> {
            Ok(format!("echo {}", *self.0.lock()))
        }
    }

    #[test]
    fn test_preserves_order_and_duplicates() {
        let mut seq = CommandSequence::new();
        seq.add_commands(["echo a", "echo b"]).unwrap();
        seq.add_commands(["echo a"]).unwrap();
        let script = seq.render().unwrap();

        let a1 = script.find("echo a").unwrap();
        let b = script.find("echo b").unwrap();
        let a2 = script.rfind("echo a").unwrap();
        assert!(a1 < b && b < a2);
        assert_eq!(script.matches("echo a").count(), 2);
    }

    #[test]
    fn test_on_exit_runs_after_main_sequence() {
        let mut seq = CommandSequence::new();
        seq.add_on_exit_commands(["echo done"]).unwrap();
        seq.add_commands(["echo work"]).unwrap();
        let script = seq.render().unwrap();

        let work = script.find("echo work").unwrap();
        let capture = script.find("exitCode=$?").unwrap();
        let done = script.find("echo done").unwrap();
        assert!(work < capture && capture < done);
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.ends_with("exit $exitCode\n"));
    }

    #[test]
    fn test_lazy_commands_render_late() {
        let counter = Arc::new(Counter(Mutex::new(1)));
        let mut seq = CommandSequence::new();
        seq.add_lazy(counter.clone()).unwrap();
        *counter.0.lock() = 7;

        let script = seq.render().unwrap();
        assert!(script.contains("echo 7"));
        assert!(!script.contains("echo 1"));
    }

    #[test]
    fn test_appends_after_render_fail() {
        let mut seq = CommandSequence::new();
        seq.add_commands(["true"]).unwrap();
        seq.render().unwrap();

        assert!(seq.is_sealed());
        let err = seq.add_commands(["false"]).unwrap_err();
        assert!(matches!(err, FarmsteadError::InvalidState(_)));
        assert!(seq.add_on_exit_commands(["false"]).is_err());
        assert!(seq.render().is_err());
    }

    struct Freezing(Arc<Mutex<bool>>);

    impl LazyCommand for Freezing {
        fn render(&self) -> FarmsteadResult<String> {
            *self.0.lock() = true;
            Ok("echo frozen".into())
        }

        fn release(&self) {
            *self.0.lock() = false;
        }
    }

    struct Failing;

    impl LazyCommand for Failing {
        fn render(&self) -> FarmsteadResult<String> {
            Err(FarmsteadError::Config("not ready".into()))
        }
    }

    #[test]
    fn test_failed_render_releases_earlier_lazy_commands() {
        let frozen = Arc::new(Mutex::new(false));
        let mut seq = CommandSequence::new();
        seq.add_lazy(Arc::new(Freezing(Arc::clone(&frozen)))).unwrap();
        seq.add_lazy(Arc::new(Failing)).unwrap();

        assert!(seq.render().is_err());
        assert!(!*frozen.lock());
        assert!(!seq.is_sealed());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
