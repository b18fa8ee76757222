//! Backend descriptor table
//!
//! Static, hand-curated metadata for every known backend: executable,
//! command grammar per operation, which operations need elevation, and how
//! its output is parsed. Built once and shared read-only.

use evopkg_exec::{Command, OutputMode};

use crate::error::PackageError;
use crate::parse::ParseStrategy;
use crate::types::{BackendKind, Operation};

/// Argument vector prefix for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    /// Helper program; `None` runs the backend's own executable
    pub program: Option<&'static str>,
    /// Arguments placed before the user's arguments
    pub args: &'static [&'static str],
}

const fn own(args: &'static [&'static str]) -> Template {
    Template {
        program: None,
        args,
    }
}

const fn helper(program: &'static str, args: &'static [&'static str]) -> Template {
    Template {
        program: Some(program),
        args,
    }
}

type Templates = &'static [(Operation, Template)];

const PACMAN_FAMILY: Templates = &[
    (Operation::Install, own(&["-S"])),
    (Operation::Remove, own(&["-R"])),
    (Operation::Search, own(&["-Ss"])),
    (Operation::Info, own(&["-Qi"])),
    (Operation::Refresh, own(&["-Sy"])),
    (Operation::Upgrade, own(&["-Syu"])),
    (Operation::Clean, own(&["-Sc"])),
    (Operation::List, own(&["-Q"])),
    (Operation::ListFiles, own(&["-Ql"])),
];

const APT: Templates = &[
    (Operation::Install, own(&["install"])),
    (Operation::Remove, own(&["remove"])),
    (Operation::Search, own(&["search"])),
    (Operation::Info, own(&["show"])),
    (Operation::Refresh, own(&["update"])),
    (Operation::Upgrade, own(&["dist-upgrade"])),
    (Operation::Clean, own(&["autoremove"])),
    (Operation::List, helper("dpkg", &["-l"])),
    (Operation::ListFiles, helper("dpkg", &["-L"])),
];

const DNF: Templates = &[
    (Operation::Install, own(&["install"])),
    (Operation::Remove, own(&["remove"])),
    (Operation::Search, own(&["search"])),
    (Operation::Info, own(&["info"])),
    (Operation::Refresh, own(&["makecache"])),
    (Operation::Upgrade, own(&["upgrade"])),
    (Operation::Clean, own(&["clean", "all"])),
    (Operation::List, own(&["list", "installed"])),
    (Operation::ListFiles, helper("rpm", &["-ql"])),
];

const ZYPPER: Templates = &[
    (Operation::Install, own(&["install"])),
    (Operation::Remove, own(&["remove"])),
    (Operation::Search, own(&["search"])),
    (Operation::Info, own(&["info"])),
    (Operation::Refresh, own(&["refresh"])),
    (Operation::Upgrade, own(&["update"])),
    (Operation::Clean, own(&["clean"])),
    (Operation::List, own(&["search", "-i"])),
    (Operation::ListFiles, helper("rpm", &["-ql"])),
];

const SNAP: Templates = &[
    (Operation::Install, own(&["install"])),
    (Operation::Remove, own(&["remove"])),
    (Operation::Search, own(&["find"])),
    (Operation::Info, own(&["info"])),
    (Operation::Refresh, own(&["refresh"])),
    (Operation::Upgrade, own(&["refresh"])),
    (Operation::List, own(&["list"])),
];

const FLATPAK: Templates = &[
    (Operation::Install, own(&["install"])),
    (Operation::Remove, own(&["uninstall"])),
    (Operation::Search, own(&["search"])),
    (Operation::Info, own(&["info"])),
    (Operation::Refresh, own(&["update", "--appstream"])),
    (Operation::Upgrade, own(&["update"])),
    (Operation::Clean, own(&["uninstall", "--unused"])),
    (Operation::List, own(&["list"])),
];

const SYSTEM_ELEVATED: &[Operation] = &[
    Operation::Install,
    Operation::Remove,
    Operation::Refresh,
    Operation::Upgrade,
    Operation::Clean,
];

const STORE_ELEVATED: &[Operation] = &[Operation::Install, Operation::Remove];

const NEVER_ELEVATED: &[Operation] = &[];

/// How a search reports that nothing matched by exiting non-zero
///
/// Any other non-zero exit is a real failure of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatch {
    /// Exit status used for an empty result
    pub status: i32,
    /// What stderr must look like for the status to mean "no match"
    pub stderr: StderrRule,
}

/// Constraint on stderr accompanying a no-match status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrRule {
    /// stderr is blank
    Empty,
    /// stderr mentions this text
    Contains(&'static str),
    /// stderr is not inspected
    Any,
}

impl NoMatch {
    /// Whether a failed search means "no match" rather than an error
    #[must_use]
    pub fn matches(&self, status: i32, stderr: &str) -> bool {
        status == self.status
            && match self.stderr {
                StderrRule::Empty => stderr.trim().is_empty(),
                StderrRule::Contains(text) => stderr.contains(text),
                StderrRule::Any => true,
            }
    }
}

const PACMAN_NO_MATCH: NoMatch = NoMatch {
    status: 1,
    stderr: StderrRule::Empty,
};

/// Immutable metadata for one backend
#[derive(Debug, Clone)]
pub struct Backend {
    /// Which backend this describes
    pub kind: BackendKind,
    /// Executable probed during detection
    pub executable: &'static str,
    /// How search/info output is parsed
    pub parse: ParseStrategy,
    templates: Templates,
    /// Repository-side details lookup; `None` when the search listing
    /// already carries the details
    details: Option<Template>,
    elevated: &'static [Operation],
    /// Exit status the search uses for an empty result, if any
    no_match: Option<NoMatch>,
}

impl Backend {
    /// Template for an operation, if the backend has one
    #[must_use]
    pub fn template(&self, operation: Operation) -> Option<Template> {
        self.templates
            .iter()
            .find(|(op, _)| *op == operation)
            .map(|(_, template)| *template)
    }

    /// Operations this backend can run
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.templates.iter().map(|(op, _)| *op)
    }

    /// Whether the operation must run with elevated privileges
    #[must_use]
    pub fn requires_elevation(&self, operation: Operation) -> bool {
        self.elevated.contains(&operation)
    }

    /// Whether a search exit means "no match" rather than a failure
    #[must_use]
    pub fn is_no_match(&self, status: i32, stderr: &str) -> bool {
        self.no_match.is_some_and(|rule| rule.matches(status, stderr))
    }

    /// Build the concrete command for an operation
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` if the backend has no template for it.
    pub fn command<S: AsRef<str>>(
        &self,
        operation: Operation,
        args: &[S],
    ) -> Result<Command, PackageError> {
        let template = self
            .template(operation)
            .ok_or(PackageError::UnsupportedOperation {
                backend: self.kind,
                operation,
            })?;

        Ok(self
            .instantiate(template, args)
            .elevated(self.requires_elevation(operation))
            .output(OutputMode::Inherit))
    }

    /// Captured search used to probe whether a package exists
    #[must_use]
    pub fn search_command(&self, package: &str) -> Command {
        let template = self.template(Operation::Search).unwrap_or(own(&[]));
        self.instantiate(template, &[package])
    }

    /// Captured details lookup, if this backend needs a separate call
    #[must_use]
    pub fn details_command(&self, package: &str) -> Option<Command> {
        self.details
            .map(|template| self.instantiate(template, &[package]))
    }

    fn instantiate<S: AsRef<str>>(&self, template: Template, args: &[S]) -> Command {
        Command::new(template.program.unwrap_or(self.executable))
            .args(template.args.iter().copied())
            .args(args.iter().map(|a| a.as_ref().to_string()))
    }
}

/// Lookup table over every known backend
#[derive(Debug, Clone)]
pub struct BackendTable {
    backends: Vec<Backend>,
}

impl BackendTable {
    /// The built-in table
    #[must_use]
    pub fn builtin() -> Self {
        let backends = BackendKind::ALL.into_iter().map(builtin_backend).collect();
        Self { backends }
    }

    /// Descriptor for a backend
    #[must_use]
    pub fn describe(&self, kind: BackendKind) -> &Backend {
        // `builtin` fills the table in `BackendKind::ALL` order.
        &self.backends[kind as usize]
    }

    /// Every descriptor in fixed order
    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}

impl Default for BackendTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_backend(kind: BackendKind) -> Backend {
    let (templates, details, elevated, parse, no_match) = match kind {
        BackendKind::Pacman => (
            PACMAN_FAMILY,
            Some(own(&["-Si"])),
            SYSTEM_ELEVATED,
            ParseStrategy::Pacman,
            Some(PACMAN_NO_MATCH),
        ),
        // AUR helpers escalate on their own.
        BackendKind::Paru | BackendKind::Yay => (
            PACMAN_FAMILY,
            Some(own(&["-Si"])),
            NEVER_ELEVATED,
            ParseStrategy::Pacman,
            Some(PACMAN_NO_MATCH),
        ),
        // apt and flatpak exit 0 with an empty listing.
        BackendKind::Apt => (
            APT,
            Some(own(&["show"])),
            SYSTEM_ELEVATED,
            ParseStrategy::Apt,
            None,
        ),
        // dnf5 exits 1; dnf4 exits 0 with the same message.
        BackendKind::Dnf => (
            DNF,
            Some(own(&["info"])),
            SYSTEM_ELEVATED,
            ParseStrategy::Dnf,
            Some(NoMatch {
                status: 1,
                stderr: StderrRule::Contains("No matches found"),
            }),
        ),
        // ZYPPER_EXIT_INF_CAP_NOT_FOUND
        BackendKind::Zypper => (
            ZYPPER,
            Some(own(&["info"])),
            SYSTEM_ELEVATED,
            ParseStrategy::Zypper,
            Some(NoMatch {
                status: 104,
                stderr: StderrRule::Any,
            }),
        ),
        BackendKind::Snap => (
            SNAP,
            Some(own(&["info"])),
            STORE_ELEVATED,
            ParseStrategy::Snap,
            Some(NoMatch {
                status: 1,
                stderr: StderrRule::Contains("No matching snaps"),
            }),
        ),
        BackendKind::Flatpak => (FLATPAK, None, STORE_ELEVATED, ParseStrategy::Flatpak, None),
    };

    Backend {
        kind,
        executable: kind.as_str(),
        parse,
        templates,
        details,
        elevated,
        no_match,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_backend_has_core_templates() {
        let table = BackendTable::builtin();
        for kind in BackendKind::ALL {
            let backend = table.describe(kind);
            assert_eq!(backend.kind, kind);
            for op in [
                Operation::Install,
                Operation::Remove,
                Operation::Search,
                Operation::Info,
            ] {
                let template = backend
                    .template(op)
                    .unwrap_or_else(|| panic!("{kind} has no {op} template"));
                assert!(!template.args.is_empty(), "{kind} {op} template is empty");
            }
        }
    }

    #[test]
    fn test_install_grammar_differs_per_backend() {
        let table = BackendTable::builtin();

        let pacman = table
            .describe(BackendKind::Pacman)
            .command(Operation::Install, &["vim"])
            .unwrap();
        assert_eq!(pacman.program, "pacman");
        assert_eq!(pacman.args, vec!["-S", "vim"]);
        assert!(pacman.elevate);

        let apt = table
            .describe(BackendKind::Apt)
            .command(Operation::Install, &["vim"])
            .unwrap();
        assert_eq!(apt.program, "apt");
        assert_eq!(apt.args, vec!["install", "vim"]);
    }

    #[test]
    fn test_helper_program_templates() {
        let table = BackendTable::builtin();
        let cmd = table
            .describe(BackendKind::Apt)
            .command(Operation::List, &[] as &[&str])
            .unwrap();
        assert_eq!(cmd.program, "dpkg");
        assert_eq!(cmd.args, vec!["-l"]);
        assert!(!cmd.elevate);
    }

    #[test]
    fn test_missing_template_is_unsupported() {
        let table = BackendTable::builtin();
        let err = table
            .describe(BackendKind::Snap)
            .command(Operation::ListFiles, &["core"])
            .unwrap_err();
        assert_eq!(
            err,
            PackageError::UnsupportedOperation {
                backend: BackendKind::Snap,
                operation: Operation::ListFiles,
            }
        );
    }

    #[test]
    fn test_aur_helpers_never_elevate() {
        let table = BackendTable::builtin();
        for kind in [BackendKind::Paru, BackendKind::Yay] {
            let backend = table.describe(kind);
            assert!(Operation::ALL.iter().all(|op| !backend.requires_elevation(*op)));
        }
    }

    #[test]
    fn test_probe_commands_capture_output() {
        let table = BackendTable::builtin();
        let search = table.describe(BackendKind::Snap).search_command("vlc");
        assert_eq!(search.args, vec!["find", "vlc"]);
        assert_eq!(search.output, OutputMode::Capture);
        assert!(!search.elevate);

        let details = table
            .describe(BackendKind::Yay)
            .details_command("yay-bin")
            .unwrap();
        assert_eq!(details.program, "yay");
        assert_eq!(details.args, vec!["-Si", "yay-bin"]);

        assert!(table.describe(BackendKind::Flatpak).details_command("x").is_none());
    }

    #[test]
    fn test_no_match_status_per_backend() {
        let table = BackendTable::builtin();

        let pacman = table.describe(BackendKind::Pacman);
        assert!(pacman.is_no_match(1, ""));
        assert!(!pacman.is_no_match(1, "error: failed to initialize alpm library"));
        assert!(!pacman.is_no_match(2, ""));

        let zypper = table.describe(BackendKind::Zypper);
        assert!(zypper.is_no_match(104, "No matching items found."));
        assert!(!zypper.is_no_match(7, "System management is locked"));

        let dnf = table.describe(BackendKind::Dnf);
        assert!(dnf.is_no_match(1, "No matches found.\n"));
        assert!(!dnf.is_no_match(1, "Error: Failed to download metadata"));

        // apt never signals "no match" through its exit status.
        let apt = table.describe(BackendKind::Apt);
        assert!(!apt.is_no_match(100, "E: Could not open lock file"));
    }
}
