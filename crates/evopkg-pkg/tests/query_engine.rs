use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use evopkg_exec::{Command, CommandResult, Dispatcher, ExecError, Interrupt};
use evopkg_pkg::*;

const PACMAN_SEARCH: &str = "\
extra/vim 9.1.0-1 (1.9 MiB 4.1 MiB)
    Vi Improved, a highly configurable, improved version of the vi text editor
extra/vim-runtime 9.1.0-1
    Runtime for vim and gvim
";

const PACMAN_INFO: &str = "\
Repository      : extra
Name            : vim
Version         : 9.1.0-1
Description     : Vi Improved, a highly configurable, improved version of the vi text editor
Depends On      : vim-runtime=9.1.0-1  gpm  acl  glibc  libgcrypt  zlib
Download Size   : 1.9 MiB
Installed Size  : 4.1 MiB
";

const APT_SEARCH: &str = "\
Sorting...
Full Text Search...
vim/jammy-updates 2:8.2.3995-1ubuntu2.15 amd64
  Vi IMproved - enhanced vi editor
";

const APT_SHOW: &str = "\
Package: vim
Version: 2:8.2.3995-1ubuntu2.15
Installed-Size: 4024 kB
Depends: vim-common (= 2:8.2.3995-1ubuntu2.15), vim-runtime (= 2:8.2.3995-1ubuntu2.15), libacl1 (>= 2.2.23)
Description: Vi IMproved - enhanced vi editor
 Vim is an almost compatible version of the UNIX editor Vi.
";

const FLATPAK_SEARCH: &str = "\
Firefox\tFast, Private & Safe Web Browser\torg.mozilla.firefox\t128.0\tstable\tflathub
Firefox Developer Edition\tDeveloper browser\torg.mozilla.FirefoxDevEdition\t129.0b1\tstable\tflathub
";

// Mock implementations
#[derive(Clone)]
struct Reply {
    status: i32,
    stdout: String,
    stderr: String,
    delay: Duration,
}

impl Reply {
    fn ok(stdout: &str) -> Self {
        Self {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            delay: Duration::ZERO,
        }
    }

    fn exit(status: i32, stderr: &str) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Answers by `(program, first argument)` and counts every call
#[derive(Default)]
struct MockDispatcher {
    replies: HashMap<(String, String), Reply>,
    calls: AtomicUsize,
    interrupt: Interrupt,
}

impl MockDispatcher {
    fn reply(mut self, program: &str, verb: &str, reply: Reply) -> Self {
        self.replies
            .insert((program.to_string(), verb.to_string()), reply);
        self
    }

    fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn run(&self, cmd: &Command) -> Result<CommandResult, ExecError> {
        self.run_with_timeout(cmd, Duration::from_secs(15)).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &Command,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let verb = cmd.args.first().cloned().unwrap_or_default();
        let reply = self
            .replies
            .get(&(cmd.program.clone(), verb))
            .cloned()
            .ok_or_else(|| ExecError::NotFound(cmd.program.clone()))?;

        tokio::select! {
            () = self.interrupt.triggered() => Err(ExecError::Interrupted),
            waited = tokio::time::timeout(timeout, tokio::time::sleep(reply.delay)) => {
                if waited.is_err() {
                    return Err(ExecError::Timeout { timeout });
                }
                if reply.status != 0 {
                    return Err(ExecError::NonZeroExit {
                        program: cmd.program.clone(),
                        status: reply.status,
                        stderr: reply.stderr,
                    });
                }
                Ok(CommandResult::ok(reply.stdout))
            }
        }
    }

    fn dispatcher_type(&self) -> &'static str {
        "mock"
    }
}

fn engine(dispatcher: &Arc<MockDispatcher>) -> QueryEngine {
    QueryEngine::new(
        Arc::clone(dispatcher) as Arc<dyn Dispatcher>,
        Arc::new(BackendTable::builtin()),
        Arc::new(ExistenceCache::new()),
    )
}

fn vim_everywhere(delay: Duration) -> MockDispatcher {
    MockDispatcher::default()
        .reply("pacman", "-Ss", Reply::ok(PACMAN_SEARCH).after(delay))
        .reply("pacman", "-Si", Reply::ok(PACMAN_INFO))
        .reply("apt", "search", Reply::ok(APT_SEARCH).after(delay))
        .reply("apt", "show", Reply::ok(APT_SHOW))
        .reply("flatpak", "search", Reply::ok(FLATPAK_SEARCH).after(delay))
}

#[tokio::test]
async fn test_query_all_parses_details() {
    let dispatcher = Arc::new(vim_everywhere(Duration::ZERO));
    let engine = engine(&dispatcher);

    let results = engine
        .query_all("vim", &[BackendKind::Pacman, BackendKind::Apt])
        .await;

    assert_eq!(results.len(), 2);
    let pacman = &results[0];
    assert_eq!(pacman.backend, BackendKind::Pacman);
    assert!(pacman.found);
    assert_eq!(pacman.version.as_deref(), Some("9.1.0-1"));
    assert_eq!(pacman.size.as_deref(), Some("4.1 MiB"));
    assert_eq!(pacman.dependencies.len(), 6);

    let apt = &results[1];
    assert!(apt.found);
    assert_eq!(apt.version.as_deref(), Some("2:8.2.3995-1ubuntu2.15"));
    assert_eq!(
        apt.dependencies,
        vec!["vim-common", "vim-runtime", "libacl1"]
    );
    assert_eq!(apt.description.as_deref(), Some("Vi IMproved - enhanced vi editor"));
}

#[tokio::test]
async fn test_second_query_is_served_from_cache() {
    let dispatcher = Arc::new(vim_everywhere(Duration::ZERO));
    let engine = engine(&dispatcher);

    let first = engine.query_all("vim", &[BackendKind::Pacman]).await;
    // search + details
    assert_eq!(dispatcher.calls(), 2);

    let second = engine.query_all("vim", &[BackendKind::Pacman]).await;
    assert_eq!(dispatcher.calls(), 2);
    assert_eq!(first, second);

    let cached = engine
        .cache()
        .get(BackendKind::Pacman, "vim")
        .await
        .unwrap();
    assert!(cached.exists);
    assert_eq!(cached.details.version.as_deref(), Some("9.1.0-1"));
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let dispatcher = Arc::new(vim_everywhere(Duration::ZERO));
    let engine = engine(&dispatcher);

    engine.query_all("vim", &[BackendKind::Apt]).await;
    assert_eq!(dispatcher.calls(), 2);

    engine
        .query_many(&["vim"], &[BackendKind::Apt], QueryOptions::refresh())
        .await;
    assert_eq!(dispatcher.calls(), 4);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_dispatch() {
    let dispatcher = Arc::new(vim_everywhere(Duration::from_millis(100)));
    let engine = engine(&dispatcher);

    let (a, b) = tokio::join!(
        engine.query_all("vim", &[BackendKind::Pacman]),
        engine.query_all("vim", &[BackendKind::Pacman]),
    );

    assert_eq!(a, b);
    assert_eq!(dispatcher.calls(), 2);
}

#[tokio::test]
async fn test_backends_run_concurrently() {
    let dispatcher = Arc::new(vim_everywhere(Duration::from_millis(250)));
    let engine = engine(&dispatcher);

    let start = Instant::now();
    let results = engine
        .query_all(
            "vim",
            &[BackendKind::Pacman, BackendKind::Apt, BackendKind::Flatpak],
        )
        .await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 3);
    // Sequential dispatch would take at least 750ms.
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
}

#[tokio::test]
async fn test_slow_backend_bounds_total_latency() {
    let dispatcher = Arc::new(
        vim_everywhere(Duration::from_millis(100))
            .reply("apt", "search", Reply::ok(APT_SEARCH).after(Duration::from_millis(300))),
    );
    let engine = engine(&dispatcher);

    let start = Instant::now();
    let results = engine
        .query_all(
            "vim",
            &[BackendKind::Pacman, BackendKind::Apt, BackendKind::Flatpak],
        )
        .await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 3);
    let apt = results
        .iter()
        .find(|r| r.backend == BackendKind::Apt)
        .unwrap();
    assert!(apt.found);
    assert_eq!(apt.failure, None);
    // max(100, 300, 100), not 500
    assert!(elapsed >= Duration::from_millis(300), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(450), "took {elapsed:?}");
}

#[tokio::test]
async fn test_slow_backend_times_out_alone() {
    let dispatcher = Arc::new(
        vim_everywhere(Duration::ZERO).reply(
            "snap",
            "find",
            Reply::ok("Name  Version\nvim   9.1\n").after(Duration::from_secs(5)),
        ),
    );
    let engine = engine(&dispatcher).with_probe_timeout(Duration::from_millis(50));

    let results = engine
        .query_all("vim", &[BackendKind::Pacman, BackendKind::Snap])
        .await;

    assert!(results[0].found);
    assert_eq!(results[0].failure, None);
    assert!(!results[1].found);
    assert_eq!(results[1].failure, Some(QueryFailure::Timeout));

    // Timeouts are not cached.
    assert!(engine.cache().get(BackendKind::Snap, "vim").await.is_none());
}

#[tokio::test]
async fn test_interrupt_returns_every_result() {
    let interrupt = Interrupt::new();
    let dispatcher = Arc::new(
        vim_everywhere(Duration::from_secs(5)).with_interrupt(interrupt.clone()),
    );
    let engine = engine(&dispatcher);

    let trigger = interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    let start = Instant::now();
    let results = engine
        .query_many(
            &["vim", "curl"],
            &[BackendKind::Pacman, BackendKind::Apt],
            QueryOptions::default(),
        )
        .await;

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(results.len(), 4);
    assert!(results
        .iter()
        .all(|r| r.failure == Some(QueryFailure::Interrupted)));
}

#[tokio::test]
async fn test_no_match_exit_is_cached_as_missing() {
    let dispatcher =
        Arc::new(MockDispatcher::default().reply("pacman", "-Ss", Reply::exit(1, "")));
    let engine = engine(&dispatcher);

    let results = engine.query_all("nonexistent-pkg", &[BackendKind::Pacman]).await;
    assert!(!results[0].found);
    assert_eq!(results[0].failure, None);

    engine.query_all("nonexistent-pkg", &[BackendKind::Pacman]).await;
    assert_eq!(dispatcher.calls(), 1);
}

#[tokio::test]
async fn test_failing_search_keeps_stderr_and_is_not_cached() {
    let lock_error = "E: Could not open lock file /var/lib/dpkg/lock-frontend";
    let dispatcher = Arc::new(
        MockDispatcher::default()
            .reply("apt", "search", Reply::exit(100, lock_error))
            .reply("pacman", "-Ss", Reply::exit(1, "error: failed to init transaction")),
    );
    let engine = engine(&dispatcher);

    let results = engine
        .query_all("curl", &[BackendKind::Pacman, BackendKind::Apt])
        .await;

    assert!(!results[0].found);
    assert!(matches!(
        &results[0].failure,
        Some(QueryFailure::NonZeroExit { status: 1, stderr }) if stderr.contains("init transaction")
    ));
    assert!(!results[1].found);
    assert_eq!(
        results[1].failure,
        Some(QueryFailure::NonZeroExit {
            status: 100,
            stderr: lock_error.to_string(),
        })
    );

    assert!(engine.cache().get(BackendKind::Apt, "curl").await.is_none());
    engine.query_all("curl", &[BackendKind::Apt]).await;
    assert_eq!(dispatcher.calls(), 3);
}

#[tokio::test]
async fn test_unparseable_details_degrade_with_raw_output() {
    let dispatcher = Arc::new(
        MockDispatcher::default()
            .reply("pacman", "-Ss", Reply::ok(PACMAN_SEARCH))
            .reply("pacman", "-Si", Reply::ok("garbage without fields\n")),
    );
    let engine = engine(&dispatcher);

    let results = engine.query_all("vim", &[BackendKind::Pacman]).await;

    let result = &results[0];
    assert!(!result.found);
    assert!(matches!(result.failure, Some(QueryFailure::ParseFailure { .. })));
    assert_eq!(result.raw_output.as_deref(), Some("garbage without fields\n"));
}

#[tokio::test]
async fn test_flatpak_matches_reverse_dns_id() {
    let dispatcher = Arc::new(vim_everywhere(Duration::ZERO));
    let engine = engine(&dispatcher);

    let results = engine.query_all("firefox", &[BackendKind::Flatpak]).await;

    let result = &results[0];
    assert!(result.found);
    assert_eq!(result.resolved_name.as_deref(), Some("org.mozilla.firefox"));
    assert_eq!(result.version.as_deref(), Some("128.0"));
    // The search listing already carries the details.
    assert_eq!(dispatcher.calls(), 1);
}

#[tokio::test]
async fn test_missing_executable_degrades() {
    let dispatcher = Arc::new(MockDispatcher::default());
    let engine = engine(&dispatcher);

    let results = engine.query_all("vim", &[BackendKind::Zypper]).await;
    assert!(matches!(
        results[0].failure,
        Some(QueryFailure::Unavailable { .. })
    ));
}

#[tokio::test]
async fn test_compare_after_query() {
    let dispatcher = Arc::new(vim_everywhere(Duration::ZERO));
    let engine = engine(&dispatcher);
    let packages = ["nonexistent-pkg", "vim"];
    let backends = [BackendKind::Apt, BackendKind::Pacman];

    let results = engine
        .query_many(&packages, &backends, QueryOptions::default())
        .await;
    let rows = compare(&packages, &backends, &results);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].package, "nonexistent-pkg");
    assert!(!rows[0].found_anywhere());
    assert_eq!(rows[1].package, "vim");
    assert_eq!(rows[1].cells[0].backend, BackendKind::Pacman);
    assert_eq!(rows[1].cells[1].backend, BackendKind::Apt);
    assert!(rows[1]
        .cells
        .iter()
        .all(|c| matches!(c.status, CellStatus::Found { .. })));
}
