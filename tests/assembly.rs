use promptweave::provider::{ContextProvider, ProviderRegistry, ProviderRequest};
use promptweave::scanner::ScanOptions;
use promptweave::{
    Assembler, AssemblyError, BuildRequest, CancellationToken, ContextFile, ContextResult,
    FileStatus, HeuristicCounter, TokenCounter,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(p, content).unwrap();
}

fn assembler() -> Assembler {
    Assembler::new(
        Arc::new(ProviderRegistry::with_builtins(&Default::default())),
        Arc::new(HeuristicCounter::default()),
    )
}

fn names(files: &[ContextFile]) -> Vec<String> {
    files.iter().map(|f| f.display_name()).collect()
}

fn assert_total_matches(res: &ContextResult) {
    let sum: usize = res.included_files.iter().map(|f| f.tokens).sum();
    assert_eq!(res.total_tokens, sum);
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn python_files_without_tests() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repoA");
    write(&repo, "main.py", "print('hi')\n");
    write(&repo, "pkg/util.py", "def f(): pass\n");
    write(&repo, "pkg/test_util.py", "def test_f(): pass\n");
    write(&repo, "test_main.py", "assert True\n");
    write(&repo, "README.md", "# readme\n");

    let req = BuildRequest::new([&repo])
        .include("**/*.py")
        .exclude("**/test_*");
    let res = assembler().build(&req).unwrap();

    assert_eq!(names(&res.included_files), vec!["main.py", "util.py"]);
    assert!(res.included_files.iter().all(|f| f.status == FileStatus::Generated));
    assert!(res.skipped_files.is_empty());
    assert_total_matches(&res);
}

#[test]
fn test_prefix_applies_to_basenames_only() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path();
    write(repo, "main.py", "a = 1\n");
    write(repo, "pkg/test_fixtures/conftest.py", "b = 2\n");
    write(repo, "test_data/loader.py", "c = 3\n");
    write(repo, "pkg/test_x.py", "d = 4\n");

    let req = BuildRequest::new([repo]).include("**/*.py").exclude("**/test_*");
    let res = assembler().build(&req).unwrap();
    assert_eq!(names(&res.included_files), vec!["main.py", "conftest.py", "loader.py"]);

    // A bare `*` stays in the root directory.
    let res = assembler().build(&BuildRequest::new([repo]).include("*.py")).unwrap();
    assert_eq!(names(&res.included_files), vec!["main.py"]);
}

#[test]
fn skipped_files_keep_match_order() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", &"a".repeat(40));
    write(tmp.path(), "b.png", "img");
    write(tmp.path(), "c.txt", &"c".repeat(40));

    let res = assembler()
        .build(&BuildRequest::new([tmp.path()]).budget(10))
        .unwrap();
    assert_eq!(names(&res.included_files), vec!["a.txt"]);
    assert_eq!(names(&res.skipped_files), vec!["b.png", "c.txt"]);
}

#[test]
fn mistyped_provider_option_is_coerced() {
    let req = BuildRequest::new(Vec::<&Path>::new())
        .provider("git_diff")
        .provider_option("git_diff", "repo_path", serde_json::json!(123))
        .provider_option("git_diff", "staged", serde_json::json!("sometimes"));
    let res = assembler().build(&req).unwrap();

    // `123` is read as the path "123", not silently replaced by ".".
    let diff = &res.included_files[0];
    assert_eq!(diff.path, Path::new("123").join("git_diff_unstaged.diff"));
    assert!(res
        .diagnostics
        .iter()
        .any(|d| d.starts_with("option git_diff.staged expects boolean")));
}

#[test]
fn oversized_first_file_is_truncated() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a_big.txt", &"abc\n".repeat(500));
    write(tmp.path(), "b_small.txt", "tiny");

    let res = assembler()
        .build(&BuildRequest::new([tmp.path()]).budget(300))
        .unwrap();

    assert_eq!(res.included_files.len(), 1);
    let big = &res.included_files[0];
    assert_eq!(big.status, FileStatus::Truncated);
    assert!(big.tokens <= 300);
    assert_eq!(names(&res.skipped_files), vec!["b_small.txt"]);
    assert_eq!(res.skipped_files[0].status, FileStatus::Skipped);
    assert!(res.total_tokens <= 300);
    assert_total_matches(&res);
    assert!(res.context_xml.contains("status=\"truncated\""));
    assert!(!res.context_xml.contains("b_small.txt"));
}

#[test]
fn binary_files_are_skipped_unread() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "logo.png", "\u{89}PNG");
    write(tmp.path(), "notes.md", "notes");

    let res = assembler().build(&BuildRequest::new([tmp.path()])).unwrap();

    assert_eq!(names(&res.included_files), vec!["notes.md"]);
    let png = &res.skipped_files[0];
    assert_eq!(png.display_name(), "logo.png");
    assert_eq!(png.status, FileStatus::Skipped);
    assert_eq!(png.tokens, 0);
    assert!(png.content.is_none());
}

struct Static {
    name: &'static str,
    body: &'static str,
}

impl ContextProvider for Static {
    fn name(&self) -> &str {
        self.name
    }

    fn get_context(&self, req: &ProviderRequest<'_>) -> Result<ContextResult, AssemblyError> {
        let tokens = req.counter.count_tokens(self.body);
        Ok(ContextResult {
            included_files: vec![ContextFile::generated("notes.txt", self.body.to_string(), tokens)],
            total_tokens: tokens,
            ..ContextResult::default()
        })
    }
}

#[test]
fn duplicate_provider_name_keeps_first() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Box::new(Static { name: "notes", body: "from the first" }))
        .unwrap();
    assert!(registry
        .register(Box::new(Static { name: "notes", body: "from the second" }))
        .is_err());

    let a = Assembler::new(Arc::new(registry), Arc::new(HeuristicCounter::default()));
    let res = a
        .build(&BuildRequest::new(Vec::<&Path>::new()).provider("notes"))
        .unwrap();

    assert_eq!(res.included_files.len(), 1);
    assert_eq!(res.included_files[0].content.as_deref(), Some("from the first"));
    assert!(res.context_xml.contains("from the first"));
    assert!(!res.context_xml.contains("from the second"));
    assert!(res.budget_details.contains("already registered"));
}

// ── Properties over real trees ─────────────────────────────────────────

#[test]
fn identical_requests_render_identically() {
    let tmp = TempDir::new().unwrap();
    for i in 0..20 {
        write(tmp.path(), &format!("d{}/f{i}.rs", i % 3), &format!("fn f{i}() {{ /* <&> */ }}\n"));
    }
    let req = BuildRequest::new([tmp.path()])
        .snippet("objective", "Review <everything> & more")
        .budget(200);

    let a = assembler();
    let first = a.build(&req).unwrap();
    let second = a.build(&req).unwrap();
    assert_eq!(first.context_xml, second.context_xml);
    assert_eq!(first, second);
}

#[test]
fn exclude_wins_over_include() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/keep.rs", "fn a() {}");
    write(tmp.path(), "src/generated.rs", "fn b() {}");

    let req = BuildRequest::new([tmp.path()])
        .include("src/*.rs")
        .exclude("src/generated.rs");
    let res = assembler().build(&req).unwrap();

    let all: Vec<String> = names(&res.included_files)
        .into_iter()
        .chain(names(&res.skipped_files))
        .collect();
    assert_eq!(all, vec!["keep.rs"]);
}

#[test]
fn overlapping_roots_are_deduplicated() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a/x.txt", "x");
    write(tmp.path(), "b.txt", "b");

    let req = BuildRequest::new([tmp.path().join("a"), tmp.path().to_path_buf()]);
    let res = assembler().build(&req).unwrap();
    assert_eq!(names(&res.included_files), vec!["x.txt", "b.txt"]);
}

#[test]
fn unreadable_roots_degrade_until_none_remain() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "ok.txt", "fine");
    let missing = tmp.path().join("missing");

    let res = assembler()
        .build(&BuildRequest::new([missing.clone(), tmp.path().to_path_buf()]))
        .unwrap();
    assert_eq!(names(&res.included_files), vec!["ok.txt"]);
    assert_eq!(res.diagnostics.len(), 1);
    assert!(res.budget_details.contains("warning: root"));

    let err = assembler().build(&BuildRequest::new([missing])).unwrap_err();
    assert!(matches!(err, AssemblyError::NoReadableRoots { .. }));
}

#[test]
fn cancelled_build_returns_cancelled() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "a");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assembler()
        .build_with_cancel(&BuildRequest::new([tmp.path()]), &cancel)
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Cancelled));
}

#[test]
fn files_and_git_diff_combine() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "hello");

    let req = BuildRequest::new([tmp.path()])
        .provider("files")
        .provider("git_diff")
        .provider_option("git_diff", "repo_path", serde_json::json!(tmp.path()));
    let res = assembler().build(&req).unwrap();

    assert_eq!(names(&res.included_files), vec!["a.txt", "git_diff_unstaged.diff"]);
    // Not a repository: the diff degrades to an error entry instead of failing the build.
    assert_eq!(res.included_files[1].status, FileStatus::Error);
    assert_total_matches(&res);
}

#[test]
fn hidden_files_follow_scan_options() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".env.example", "A=1");
    write(tmp.path(), "visible.txt", "v");

    let hidden_off = assembler().with_scan_options(ScanOptions {
        include_hidden: false,
        ..ScanOptions::default()
    });
    let res = hidden_off.build(&BuildRequest::new([tmp.path()])).unwrap();
    assert_eq!(names(&res.included_files), vec!["visible.txt"]);

    let res = assembler().build(&BuildRequest::new([tmp.path()])).unwrap();
    assert_eq!(names(&res.included_files), vec![".env.example", "visible.txt"]);
}

#[test]
fn instructions_render_before_context() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "a");
    let mut req = BuildRequest::new([tmp.path()])
        .snippet("objective", "First")
        .snippet("constraints", "Second");
    req.questions = vec!["Why?".into()];

    let xml = assembler().build(&req).unwrap().context_xml;
    let objective = xml.find("<objective>").unwrap();
    let constraints = xml.find("<constraints>").unwrap();
    let questions = xml.find("<questions>Why?</questions>").unwrap();
    let context = xml.find("<context>").unwrap();
    assert!(objective < constraints && constraints < questions && questions < context);
}

/// Cancels the build after the first file has been counted.
struct CancelAfterFirst {
    cancel: CancellationToken,
    calls: Arc<AtomicUsize>,
}

impl TokenCounter for CancelAfterFirst {
    fn count_tokens(&self, text: &str) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        text.len()
    }

    fn describe(&self) -> String {
        "cancel-after-first".into()
    }
}

#[test]
fn cancellation_between_files_stops_the_build() {
    let tmp = TempDir::new().unwrap();
    for i in 0..500 {
        write(tmp.path(), &format!("f{i:03}.txt"), "x");
    }

    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let a = Assembler::new(
        Arc::new(ProviderRegistry::with_builtins(&Default::default())),
        Arc::new(CancelAfterFirst {
            cancel: cancel.clone(),
            calls: calls.clone(),
        }),
    );

    let err = a
        .build_with_cancel(&BuildRequest::new([tmp.path()]), &cancel)
        .unwrap_err();
    assert!(matches!(err, AssemblyError::Cancelled));
    // At most one file in flight per worker finishes after the cancel.
    let counted = calls.load(Ordering::SeqCst);
    assert!(counted >= 1 && counted < 500, "counted {counted} files");
}
