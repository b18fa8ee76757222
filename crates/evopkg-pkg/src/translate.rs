//! Syntax translation
//!
//! A simulated syntax is only the grammar the user typed. It decides which
//! [`Operation`] a verb means; the target backend alone decides the
//! concrete command line.

use std::sync::Arc;

use evopkg_exec::Command;
use tracing::debug;

use crate::descriptor::BackendTable;
use crate::error::PackageError;
use crate::types::{BackendKind, Operation};

type Grammar = &'static [(&'static str, Operation)];

const PACMAN_VERBS: Grammar = &[
    ("-S", Operation::Install),
    ("-R", Operation::Remove),
    ("-Rs", Operation::Remove),
    ("-Rns", Operation::Remove),
    ("-Ss", Operation::Search),
    ("-Si", Operation::Info),
    ("-Qi", Operation::Info),
    ("-Sy", Operation::Refresh),
    ("-Syu", Operation::Upgrade),
    ("-Sc", Operation::Clean),
    ("-Scc", Operation::Clean),
    ("-Q", Operation::List),
    ("-Ql", Operation::ListFiles),
];

const APT_VERBS: Grammar = &[
    ("purge", Operation::Remove),
    ("show", Operation::Info),
    ("update", Operation::Refresh),
    ("dist-upgrade", Operation::Upgrade),
    ("full-upgrade", Operation::Upgrade),
    ("autoremove", Operation::Clean),
];

const DNF_VERBS: Grammar = &[
    ("erase", Operation::Remove),
    ("makecache", Operation::Refresh),
    ("update", Operation::Upgrade),
    ("repoquery", Operation::List),
];

const ZYPPER_VERBS: Grammar = &[
    ("in", Operation::Install),
    ("rm", Operation::Remove),
    ("se", Operation::Search),
    ("if", Operation::Info),
    ("ref", Operation::Refresh),
    ("refresh", Operation::Refresh),
    ("up", Operation::Upgrade),
    ("update", Operation::Upgrade),
    ("dup", Operation::Upgrade),
    ("dist-upgrade", Operation::Upgrade),
    ("cc", Operation::Clean),
    ("packages", Operation::List),
];

const SNAP_VERBS: Grammar = &[
    ("find", Operation::Search),
    ("refresh", Operation::Upgrade),
];

const FLATPAK_VERBS: Grammar = &[
    ("uninstall", Operation::Remove),
    ("update", Operation::Upgrade),
];

/// Verbs every grammar understands, after its own
const NEUTRAL_VERBS: Grammar = &[
    ("install", Operation::Install),
    ("remove", Operation::Remove),
    ("search", Operation::Search),
    ("info", Operation::Info),
    ("update", Operation::Refresh),
    ("upgrade", Operation::Upgrade),
    ("clean", Operation::Clean),
    ("list", Operation::List),
    ("files", Operation::ListFiles),
];

fn grammar(syntax: BackendKind) -> Grammar {
    match syntax {
        BackendKind::Pacman | BackendKind::Paru | BackendKind::Yay => PACMAN_VERBS,
        BackendKind::Apt => APT_VERBS,
        BackendKind::Dnf => DNF_VERBS,
        BackendKind::Zypper => ZYPPER_VERBS,
        BackendKind::Snap => SNAP_VERBS,
        BackendKind::Flatpak => FLATPAK_VERBS,
    }
}

/// Operation a verb means in a simulated syntax
///
/// # Errors
/// Returns `UnknownVerb` if neither the syntax's own grammar nor the neutral
/// verbs know it.
pub fn parse_verb(syntax: BackendKind, verb: &str) -> Result<Operation, PackageError> {
    let verb = verb.trim();
    grammar(syntax)
        .iter()
        .chain(NEUTRAL_VERBS)
        .find(|(word, _)| *word == verb)
        .map(|(_, op)| *op)
        .ok_or_else(|| PackageError::UnknownVerb {
            syntax,
            verb: verb.to_string(),
        })
}

/// Preferred verb for an operation in a simulated syntax
#[must_use]
pub fn verb_for(syntax: BackendKind, operation: Operation) -> Option<&'static str> {
    grammar(syntax)
        .iter()
        .chain(NEUTRAL_VERBS)
        .find(|(word, op)| *op == operation && parse_verb(syntax, word).ok() == Some(operation))
        .map(|(word, _)| *word)
}

/// Simulated syntax implied by a program name (`dnf` invoked on Arch)
#[must_use]
pub fn syntax_for_program(program: &str) -> Option<BackendKind> {
    let name = std::path::Path::new(program).file_name()?.to_str()?;
    name.parse().ok()
}

/// Translates user operations into backend commands
#[derive(Debug, Clone)]
pub struct Translator {
    table: Arc<BackendTable>,
}

impl Translator {
    /// Create a translator over a descriptor table
    pub fn new(table: Arc<BackendTable>) -> Self {
        Self { table }
    }

    /// Concrete command for `operation`, typed in `syntax`, run by `target`
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` if the syntax cannot express the
    /// operation or the target has no template for it, and `MissingPackages`
    /// if a package operation has no arguments.
    pub fn translate<S: AsRef<str>>(
        &self,
        operation: Operation,
        syntax: BackendKind,
        target: BackendKind,
        args: &[S],
    ) -> Result<Command, PackageError> {
        if verb_for(syntax, operation).is_none() {
            return Err(PackageError::UnsupportedOperation {
                backend: syntax,
                operation,
            });
        }
        if operation.takes_packages() && args.is_empty() {
            return Err(PackageError::MissingPackages(operation));
        }

        let command = self.table.describe(target).command(operation, args)?;
        debug!(%syntax, %target, %operation, command = %command, "translated");
        Ok(command)
    }

    /// Parse `verb` in `syntax`, then translate it for `target`
    ///
    /// # Errors
    /// Returns `UnknownVerb` for verbs outside the grammar, plus every error
    /// of [`Translator::translate`].
    pub fn translate_verb<S: AsRef<str>>(
        &self,
        verb: &str,
        syntax: BackendKind,
        target: BackendKind,
        args: &[S],
    ) -> Result<(Operation, Command), PackageError> {
        let operation = parse_verb(syntax, verb)?;
        let command = self.translate(operation, syntax, target, args)?;
        Ok((operation, command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> Translator {
        Translator::new(Arc::new(BackendTable::builtin()))
    }

    #[test]
    fn test_dnf_syntax_runs_pacman() {
        let cmd = translator()
            .translate(Operation::Install, BackendKind::Dnf, BackendKind::Pacman, &["vim"])
            .unwrap();

        assert_eq!(cmd.program, "pacman");
        assert_eq!(cmd.args, vec!["-S", "vim"]);
        assert!(cmd.elevate);
    }

    #[test]
    fn test_pacman_flags_run_apt() {
        let (op, cmd) = translator()
            .translate_verb("-Ss", BackendKind::Pacman, BackendKind::Apt, &["curl"])
            .unwrap();

        assert_eq!(op, Operation::Search);
        assert_eq!(cmd.program, "apt");
        assert_eq!(cmd.args, vec!["search", "curl"]);
        assert!(!cmd.elevate);
    }

    #[test]
    fn test_grammar_specific_verbs() {
        assert_eq!(parse_verb(BackendKind::Zypper, "in").unwrap(), Operation::Install);
        assert_eq!(parse_verb(BackendKind::Apt, "show").unwrap(), Operation::Info);
        assert_eq!(parse_verb(BackendKind::Apt, "update").unwrap(), Operation::Refresh);
        assert_eq!(parse_verb(BackendKind::Dnf, "update").unwrap(), Operation::Upgrade);
        assert_eq!(parse_verb(BackendKind::Snap, "find").unwrap(), Operation::Search);
        assert_eq!(parse_verb(BackendKind::Yay, "-Syu").unwrap(), Operation::Upgrade);
        assert_eq!(parse_verb(BackendKind::Pacman, "install").unwrap(), Operation::Install);
        assert_eq!(parse_verb(BackendKind::Dnf, "repoquery").unwrap(), Operation::List);
        assert_eq!(parse_verb(BackendKind::Zypper, "packages").unwrap(), Operation::List);
    }

    #[test]
    fn test_dnf_repoquery_lists_with_pacman() {
        let (op, cmd) = translator()
            .translate_verb("repoquery", BackendKind::Dnf, BackendKind::Pacman, &[] as &[&str])
            .unwrap();

        assert_eq!(op, Operation::List);
        assert_eq!(cmd.program, "pacman");
        assert_eq!(cmd.args, vec!["-Q"]);
    }

    #[test]
    fn test_unknown_verb() {
        let err = parse_verb(BackendKind::Apt, "-S").unwrap_err();
        assert_eq!(
            err,
            PackageError::UnknownVerb {
                syntax: BackendKind::Apt,
                verb: "-S".to_string(),
            }
        );
    }

    #[test]
    fn test_target_without_template_is_unsupported() {
        let err = translator()
            .translate_verb("-Ql", BackendKind::Pacman, BackendKind::Flatpak, &["org.gimp.GIMP"])
            .unwrap_err();
        assert_eq!(
            err,
            PackageError::UnsupportedOperation {
                backend: BackendKind::Flatpak,
                operation: Operation::ListFiles,
            }
        );
    }

    #[test]
    fn test_package_operations_need_arguments() {
        let err = translator()
            .translate(Operation::Remove, BackendKind::Apt, BackendKind::Dnf, &[] as &[&str])
            .unwrap_err();
        assert_eq!(err, PackageError::MissingPackages(Operation::Remove));

        let upgrade = translator()
            .translate(Operation::Upgrade, BackendKind::Apt, BackendKind::Zypper, &[] as &[&str])
            .unwrap();
        assert_eq!(upgrade.args, vec!["update"]);
    }

    #[test]
    fn test_every_syntax_expresses_core_operations() {
        for syntax in BackendKind::ALL {
            for op in [
                Operation::Install,
                Operation::Remove,
                Operation::Search,
                Operation::Info,
            ] {
                let verb = verb_for(syntax, op).unwrap();
                assert_eq!(parse_verb(syntax, verb).unwrap(), op);
            }
        }
    }

    #[test]
    fn test_syntax_for_program() {
        assert_eq!(syntax_for_program("/usr/local/bin/dnf"), Some(BackendKind::Dnf));
        assert_eq!(syntax_for_program("mypkg"), None);
    }
}
