use super::*;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use relpack_core::{BuildContext, ReleaseIdentity};
use tar::{Archive, EntryType, Header};

use crate::differ::run_differ_step;
use crate::systools::{build_systools_command, relup_expression, script_expression, tar_expression};

const BASE_ENTRY: &str = "/opt/erlang/lib/kernel-2.14.5/ebin";

struct Fixture {
    root: PathBuf,
    work: PathBuf,
    old: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn request(&self) -> BuildRequest {
        BuildRequest {
            layout: WorkspaceLayout::new(&self.work),
            reltool_config: self.config.clone(),
            previous_release: self.old.clone(),
        }
    }

    fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.work)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn test_root(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "relpack-builder-{label}-{}-{nanos}",
        std::process::id()
    ))
}

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("must create parent");
    fs::write(path, contents).expect("must write file");
}

fn rel_manifest(name: &str, version: &str) -> String {
    format!(
        "{{release, {{\"{name}\", \"{version}\"}}, {{erts, \"5.8.5\"}},\n [{{kernel, \"2.14.5\"}}, {{stdlib, \"1.17.5\"}}, {{{name}, \"{version}\"}}]}}.\n"
    )
}

fn reltool_config(name: &str, version: &str) -> String {
    format!(
        "{{sys, [\n  {{lib_dirs, []}},\n  {{rel, \"{name}\", \"{version}\", [kernel, stdlib, {name}]}},\n  {{rel, \"start_clean\", \"\", [kernel, stdlib]}},\n  {{boot_rel, \"{name}\"}}\n]}}.\n{{target_dir, \"{name}\"}}.\n"
    )
}

/// `reltool` declares the config identity; `new_rel`/`old_rel` are what the trees' manifests say.
fn fixture_with(
    label: &str,
    reltool: (&str, &str),
    new_rel: (&str, &str),
    old_rel: (&str, &str),
) -> Fixture {
    let root = test_root(label);
    let work = root.join("work");
    let old = root.join("deployed").join("myapp");
    let (tree_name, new_version) = reltool;
    let old_version = old_rel.1;

    let config = work.join("reltool.config");
    write_file(&config, &reltool_config(reltool.0, reltool.1));

    let new_tree = work.join(tree_name);
    let new_release = new_tree.join("releases").join(new_version);
    write_file(
        &new_release.join(format!("{tree_name}.rel")),
        &rel_manifest(new_rel.0, new_rel.1),
    );
    write_file(&new_release.join("start.boot"), "new start.boot");
    write_file(&new_release.join("start_clean.boot"), "new start_clean.boot");
    write_file(
        &new_tree.join(format!("lib/{tree_name}-{new_version}/ebin/{tree_name}.beam")),
        "new beam",
    );

    let old_release = old.join("releases").join(old_version);
    write_file(
        &old_release.join(format!("{tree_name}.rel")),
        &rel_manifest(old_rel.0, old_rel.1),
    );
    write_file(&old_release.join("start.boot"), "old start.boot");
    write_file(&old.join("releases/RELEASES"), "[].");
    write_file(
        &old.join(format!("lib/{tree_name}-{old_version}/ebin/{tree_name}.beam")),
        "old beam",
    );
    write_file(&old.join("lib/stdlib-1.17.5/ebin/lists.beam"), "lists");
    write_file(&old.join("lib/docs-1.0/priv/index.html"), "<html/>");

    Fixture {
        root,
        work,
        old,
        config,
    }
}

fn fixture(label: &str, new_version: &str, old_version: &str) -> Fixture {
    fixture_with(
        label,
        ("myapp", new_version),
        ("myapp", new_version),
        ("myapp", old_version),
    )
}

fn base_search() -> SearchContext {
    SearchContext::new([PathBuf::from(BASE_ENTRY)])
}

fn dir_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .expect("must read dir")
        .map(|entry| {
            entry
                .expect("must read entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TarEntry {
    path: String,
    kind: EntryType,
    link: Option<String>,
    mtime: u64,
    uid: u64,
    contents: String,
}

fn read_package(path: &Path) -> Vec<TarEntry> {
    let file = File::open(path).expect("must open package");
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in archive.entries().expect("must list entries") {
        let mut entry = entry.expect("must read entry");
        let header = entry.header().clone();
        let path = entry
            .path()
            .expect("entry path")
            .to_string_lossy()
            .into_owned();
        let link = entry
            .link_name()
            .expect("link name")
            .map(|link| link.to_string_lossy().into_owned());
        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .expect("must read entry contents");
        entries.push(TarEntry {
            path,
            kind: header.entry_type(),
            link,
            mtime: header.mtime().expect("mtime"),
            uid: header.uid().expect("uid"),
            contents,
        });
    }
    entries
}

/// Writes what `systools` would produce and records every call it receives.
struct FakeDiffer {
    version: String,
    fail_at: Option<DifferStep>,
    calls: RefCell<Vec<String>>,
    searches: RefCell<Vec<Vec<PathBuf>>>,
}

impl FakeDiffer {
    fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            fail_at: None,
            calls: RefCell::new(Vec::new()),
            searches: RefCell::new(Vec::new()),
        }
    }

    fn failing_at(version: &str, step: DifferStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new(version)
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn observe(&self, step: DifferStep, call: &DifferCall<'_>, detail: &str) -> Result<(), DifferError> {
        self.calls
            .borrow_mut()
            .push(format!("{}:{}{detail}", step.as_str(), call.release));
        self.searches
            .borrow_mut()
            .push(call.search.entries().to_vec());
        if self.fail_at == Some(step) {
            return Err(DifferError::new("error", format!("{{{}, simulated}}", step.as_str())));
        }
        Ok(())
    }

    fn write_raw_tarball(&self, call: &DifferCall<'_>) {
        let path = call.work_dir.join(format!("{}.tar.gz", call.release));
        let file = File::create(&path).expect("must create raw tarball");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        let version = &self.version;
        let files = [
            (format!("lib/myapp-{version}/ebin/myapp.beam"), "new beam".to_string()),
            (format!("lib/myapp-{version}/ebin/myapp.app"), "{application, myapp, []}.".to_string()),
            (format!("releases/{version}/myapp.rel"), rel_manifest("myapp", version)),
            (format!("releases/{version}/start.boot"), "generated boot".to_string()),
            (format!("releases/{version}/relup"), "relup".to_string()),
        ];
        for (entry_path, contents) in files {
            let mut header = Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_700_000_000);
            builder
                .append_data(&mut header, entry_path, contents.as_bytes())
                .expect("must append entry");
        }
        builder
            .into_inner()
            .expect("must finish tar")
            .finish()
            .expect("must finish gzip");
    }
}

impl ReleaseDiffer for FakeDiffer {
    fn make_relup(
        &self,
        call: &DifferCall<'_>,
        up_from: &[String],
        down_to: &[String],
    ) -> Result<(), DifferError> {
        self.observe(
            DifferStep::Relup,
            call,
            &format!(":{up_from:?}:{down_to:?}"),
        )?;
        write_file(&call.work_dir.join("relup"), "{\"1.1\", [], []}.");
        Ok(())
    }

    fn make_script(&self, call: &DifferCall<'_>) -> Result<(), DifferError> {
        write_file(
            &call.work_dir.join(format!("{}.script", call.release)),
            "{script, {}, []}.",
        );
        self.observe(DifferStep::Script, call, "")?;
        write_file(
            &call.work_dir.join(format!("{}.boot", call.release)),
            "boot",
        );
        Ok(())
    }

    fn make_tar(&self, call: &DifferCall<'_>) -> Result<(), DifferError> {
        self.observe(DifferStep::Tar, call, "")?;
        self.write_raw_tarball(call);
        Ok(())
    }
}

#[test]
fn build_produces_package_with_only_lib_and_releases() {
    let fixture = fixture("happy", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    let outcome = report.result.expect("build should succeed");

    assert_eq!(outcome.package, fixture.work.join("myapp_1.1.tar.gz"));
    assert_eq!(outcome.context.name_ver(), "myapp_1.1");
    assert_eq!(outcome.sha256.len(), 64);
    assert_eq!(
        outcome.sha256,
        sha256_file_hex(&outcome.package).expect("must hash")
    );

    let entries = read_package(&outcome.package);
    let top_level = entries
        .iter()
        .filter_map(|entry| entry.path.split('/').next().map(str::to_string))
        .collect::<BTreeSet<_>>();
    assert_eq!(
        top_level,
        BTreeSet::from(["lib".to_string(), "releases".to_string()])
    );

    let paths = entries
        .iter()
        .map(|entry| entry.path.trim_end_matches('/').to_string())
        .collect::<Vec<_>>();
    assert!(paths.contains(&"lib/myapp-1.1/ebin/myapp.beam".to_string()));
    assert!(paths.contains(&"releases/1.1/start.boot".to_string()));
    assert!(paths.contains(&"releases/1.1/start_clean.boot".to_string()));
    assert!(paths.iter().position(|p| p == "lib") < paths.iter().position(|p| p == "releases"));

    let start_clean = entries
        .iter()
        .find(|entry| entry.path == "releases/1.1/start_clean.boot")
        .expect("start_clean.boot must be packaged");
    assert_eq!(start_clean.contents, "new start_clean.boot");
    assert!(entries.iter().all(|entry| entry.mtime == 0 && entry.uid == 0));

    #[cfg(unix)]
    {
        let link = entries
            .iter()
            .find(|entry| entry.path == "releases/1.1/myapp.boot")
            .expect("boot link must be packaged");
        assert_eq!(link.kind, EntryType::Symlink);
        assert_eq!(link.link.as_deref(), Some("start.boot"));
    }

    assert!(report.cleanup.is_clean(), "{:?}", report.cleanup.warnings);
    assert!(report.cleanup.search_path_restored);
}

#[test]
fn build_leaves_only_the_package_behind() {
    let fixture = fixture("residue", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    report.result.expect("build should succeed");

    assert_eq!(
        dir_names(&fixture.work),
        BTreeSet::from([
            "myapp".to_string(),
            "myapp_1.1.tar.gz".to_string(),
            "reltool.config".to_string(),
        ])
    );
    assert!(fixture.work.join("myapp/releases/1.1/start.boot").is_file());
}

#[test]
fn build_calls_toolchain_in_order_with_name_ver_release() {
    let fixture = fixture("order", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect("build should succeed");

    assert_eq!(
        differ.calls(),
        vec![
            "make_relup:myapp_1.1:[\"myapp\"]:[\"myapp\"]".to_string(),
            "make_script:myapp_1.1".to_string(),
            "make_tar:myapp_1.1".to_string(),
        ]
    );
}

#[test]
fn build_hands_staged_search_path_to_toolchain_and_restores_it() {
    let fixture = fixture("search", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();
    let before = search.clone();

    build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect("build should succeed");

    assert_eq!(search, before);
    let expected = vec![
        PathBuf::from(BASE_ENTRY),
        fixture.old.join("releases/1.0"),
        fixture.old.join("lib/myapp-1.0/ebin"),
        fixture.old.join("lib/stdlib-1.17.5/ebin"),
        fixture.work.join("myapp/lib/myapp-1.1/ebin"),
        fixture.work.join("myapp/lib"),
        fixture.work.join("myapp/releases"),
    ];
    let searches = differ.searches.borrow();
    assert_eq!(searches.len(), 3);
    assert!(searches.iter().all(|seen| *seen == expected));
}

#[test]
fn build_rejects_unchanged_version_before_any_side_effect() {
    let fixture = fixture("same-version", "1.1", "1.1");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();
    let before = dir_names(&fixture.work);

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    let err = report.result.expect_err("build must fail");

    assert!(matches!(
        err,
        BuildError::Validation(ValidationError::VersionUnchanged(ref version)) if version == "1.1"
    ));
    assert!(differ.calls().is_empty());
    assert_eq!(dir_names(&fixture.work), before);
    assert_eq!(search, base_search());
    assert!(report.cleanup.removed.is_empty());
}

#[test]
fn build_rejects_reltool_version_mismatch_without_toolchain_calls() {
    let fixture = fixture_with(
        "declared-version",
        ("myapp", "1.1"),
        ("myapp", "1.2"),
        ("myapp", "1.0"),
    );
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let err = build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect_err("build must fail");

    assert!(matches!(
        err,
        BuildError::Validation(ValidationError::DeclaredVersionMismatch { ref reltool, ref rel })
            if reltool == "1.1" && rel == "1.2"
    ));
    assert!(differ.calls().is_empty());
    assert!(!fixture.work.join("myapp_1.1.rel").exists());
}

#[test]
fn build_rejects_reltool_name_mismatch_without_toolchain_calls() {
    let fixture = fixture_with(
        "declared-name",
        ("myapp", "1.1"),
        ("otherapp", "1.1"),
        ("otherapp", "1.0"),
    );
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let err = build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect_err("build must fail");

    assert!(matches!(
        err,
        BuildError::Validation(ValidationError::DeclaredNameMismatch { .. })
    ));
    assert!(differ.calls().is_empty());
}

#[test]
fn build_rejects_release_name_change_between_trees() {
    let fixture = fixture_with(
        "name-change",
        ("myapp", "1.1"),
        ("myapp", "1.1"),
        ("legacy", "1.0"),
    );
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let err = build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect_err("build must fail");

    assert_eq!(
        err.to_string(),
        "validation failed: new and old .rel release names do not match (myapp vs legacy)"
    );
}

#[test]
fn build_requires_both_release_trees() {
    let fixture = fixture("trees", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let mut request = fixture.request();
    request.previous_release = fixture.root.join("nowhere");
    let err = build_upgrade_package(&request, &differ, &mut search)
        .result
        .expect_err("missing old tree must fail");
    assert!(matches!(
        err,
        BuildError::Validation(ValidationError::OldTreeMissing(_))
    ));

    fs::remove_dir_all(fixture.work.join("myapp")).expect("must remove new tree");
    let err = build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect_err("missing new tree must fail");
    assert!(matches!(
        err,
        BuildError::Validation(ValidationError::NewTreeMissing(ref path))
            if *path == fixture.work.join("myapp")
    ));
    assert!(differ.calls().is_empty());
}

#[test]
fn build_resolves_relative_previous_release_from_work_dir() {
    let fixture = fixture("relative", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();
    let mut request = fixture.request();
    request.previous_release = PathBuf::from("../deployed/myapp");

    build_upgrade_package(&request, &differ, &mut search)
        .result
        .expect("relative previous release should resolve");
}

#[test]
fn build_surfaces_ambiguous_old_manifests() {
    let fixture = fixture("ambiguous", "1.1", "1.0");
    write_file(
        &fixture.old.join("releases/0.9/myapp.rel"),
        &rel_manifest("myapp", "0.9"),
    );
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let err = build_upgrade_package(&fixture.request(), &differ, &mut search)
        .result
        .expect_err("build must fail");
    assert!(matches!(
        err,
        BuildError::Descriptor(relpack_core::DescriptorError::AmbiguousRelease { .. })
    ));
}

#[test]
fn toolchain_failure_rolls_back_artifacts_and_search_path() {
    let fixture = fixture("script-failure", "1.1", "1.0");
    let differ = FakeDiffer::failing_at("1.1", DifferStep::Script);
    let mut search = base_search();
    let before = dir_names(&fixture.work);

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    let err = report.result.expect_err("build must fail");

    match &err {
        BuildError::ExternalTool { step, reason } => {
            assert_eq!(*step, DifferStep::Script);
            assert_eq!(reason, "{make_script, simulated}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "systools:make_script aborted with: {make_script, simulated}"
    );
    assert_eq!(differ.calls().len(), 2);
    assert_eq!(dir_names(&fixture.work), before);
    assert_eq!(search, base_search());
    assert!(report.cleanup.search_path_restored);
    assert!(report
        .cleanup
        .removed
        .contains(&fixture.work.join("myapp_1.1.script")));
}

#[test]
fn tar_failure_leaves_no_partial_package() {
    let fixture = fixture("tar-failure", "1.1", "1.0");
    let differ = FakeDiffer::failing_at("1.1", DifferStep::Tar);
    let mut search = base_search();
    let before = dir_names(&fixture.work);

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    assert!(matches!(
        report.result,
        Err(BuildError::ExternalTool {
            step: DifferStep::Tar,
            ..
        })
    ));
    assert_eq!(dir_names(&fixture.work), before);
}

#[test]
fn existing_releases_dir_is_reported_and_preserved() {
    let fixture = fixture("releases-exists", "1.1", "1.0");
    write_file(&fixture.work.join("releases/KEEP"), "operator data");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);
    let err = report.result.expect_err("build must fail");

    assert!(matches!(
        err,
        BuildError::DirectoryExists(ref path) if *path == fixture.work.join("releases")
    ));
    assert!(fixture.work.join("releases/KEEP").is_file());
    assert!(!fixture.work.join("lib").exists());
    assert!(!fixture.work.join("relup").exists());
    assert!(!fixture.work.join("myapp_1.1.tar.gz").exists());
    assert_eq!(search, base_search());
}

#[test]
fn existing_lib_dir_is_reported_and_preserved() {
    let fixture = fixture("lib-exists", "1.1", "1.0");
    write_file(&fixture.work.join("lib/KEEP"), "operator data");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();

    let report = build_upgrade_package(&fixture.request(), &differ, &mut search);

    assert!(matches!(
        report.result,
        Err(BuildError::DirectoryExists(ref path)) if *path == fixture.work.join("lib")
    ));
    assert!(fixture.work.join("lib/KEEP").is_file());
    assert!(!fixture.work.join("releases").exists());
}

#[test]
fn repeated_builds_produce_identical_archives() {
    let first = fixture("determinism-a", "1.1", "1.0");
    let second = fixture("determinism-b", "1.1", "1.0");

    let mut search = base_search();
    let first_outcome = build_upgrade_package(&first.request(), &FakeDiffer::new("1.1"), &mut search)
        .result
        .expect("first build should succeed");
    let second_outcome =
        build_upgrade_package(&second.request(), &FakeDiffer::new("1.1"), &mut search)
            .result
            .expect("second build should succeed");

    let first_bytes = fs::read(&first_outcome.package).expect("must read first package");
    let second_bytes = fs::read(&second_outcome.package).expect("must read second package");
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first_outcome.sha256, second_outcome.sha256);
}

#[test]
fn hooks_observe_every_stage_in_order() {
    let fixture = fixture("hooks", "1.1", "1.0");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();
    let mut seen = Vec::new();

    build_upgrade_package_with_hooks(&fixture.request(), &differ, &mut search, |stage| {
        seen.push(stage)
    })
    .result
    .expect("build should succeed");

    assert_eq!(seen, PipelineStage::ALL.to_vec());
}

#[test]
fn hooks_skip_cleanup_when_validation_fails() {
    let fixture = fixture("hooks-invalid", "1.1", "1.1");
    let differ = FakeDiffer::new("1.1");
    let mut search = base_search();
    let mut seen = Vec::new();

    let report =
        build_upgrade_package_with_hooks(&fixture.request(), &differ, &mut search, |stage| {
            seen.push(stage)
        });

    assert!(report.result.is_err());
    assert_eq!(seen, vec![PipelineStage::Validate]);
}

#[test]
fn plan_reports_paths_without_touching_work_dir() {
    let fixture = fixture("plan", "1.1", "1.0");
    let before = dir_names(&fixture.work);

    let plan = plan_upgrade_package(&fixture.request(), &base_search()).expect("plan should resolve");

    assert_eq!(dir_names(&fixture.work), before);
    assert_eq!(plan.package, fixture.work.join("myapp_1.1.tar.gz"));
    assert_eq!(plan.context.old_version(), "1.0");
    assert_eq!(plan.resolved.reltool, ReleaseIdentity::new("myapp", "1.1"));
    assert_eq!(plan.search.entries()[0], PathBuf::from(BASE_ENTRY));
    assert_eq!(plan.search.len(), 7);
    assert_eq!(plan.artifacts.len(), Artifact::ALL.len());
    assert_eq!(
        plan.artifacts[0],
        (
            Artifact::BootLink,
            fixture.work.join("releases/1.1/myapp.boot")
        )
    );
}

#[test]
fn check_identities_runs_name_checks_before_version_checks() {
    let reltool = ReleaseIdentity::new("myapp", "2.0");
    let new = ReleaseIdentity::new("myapp", "1.0");
    let old = ReleaseIdentity::new("other", "1.0");

    assert!(matches!(
        check_identities(&reltool, &new, &old),
        Err(ValidationError::NameMismatch { .. })
    ));
    assert!(matches!(
        check_identities(&reltool, &new, &ReleaseIdentity::new("myapp", "1.0")),
        Err(ValidationError::VersionUnchanged(_))
    ));
    assert!(check_identities(
        &ReleaseIdentity::new("myapp", "1.1"),
        &ReleaseIdentity::new("myapp", "1.1"),
        &ReleaseIdentity::new("myapp", "1.0"),
    )
    .is_ok());
}

#[test]
fn staged_path_follows_lookup_order() {
    let fixture = fixture("staged", "1.1", "1.0");
    let layout = fixture.layout();

    let staged = StagedPath::collect(&layout.old_tree(&fixture.old), &layout.new_tree("myapp"))
        .expect("must collect");

    assert_eq!(staged.old_releases, vec![fixture.old.join("releases/1.0")]);
    assert_eq!(
        staged.old_ebins,
        vec![
            fixture.old.join("lib/myapp-1.0/ebin"),
            fixture.old.join("lib/stdlib-1.17.5/ebin"),
        ]
    );
    assert_eq!(
        staged.new_ebins,
        vec![fixture.work.join("myapp/lib/myapp-1.1/ebin")]
    );
    assert_eq!(
        staged.new_top_level,
        vec![
            fixture.work.join("myapp/lib"),
            fixture.work.join("myapp/releases"),
        ]
    );
    assert_eq!(staged.entries().count(), 6);
}

#[test]
fn search_context_append_skips_duplicates() {
    let mut context = SearchContext::new([PathBuf::from("/a"), PathBuf::from("/b")]);
    context.append([PathBuf::from("/b"), PathBuf::from("/c")]);
    assert_eq!(
        context.entries(),
        &[PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
    );
}

#[test]
fn search_path_lease_restores_exactly_once() {
    let mut search = base_search();
    {
        let mut lease = SearchPathLease::acquire(&mut search);
        lease.install(SearchContext::new([PathBuf::from("/staged")]));
        assert_eq!(lease.current().entries(), &[PathBuf::from("/staged")]);
        assert_eq!(lease.snapshot(), Some(&base_search()));
        assert!(lease.restore());
        assert!(!lease.restore());
        assert_eq!(lease.current(), &base_search());
    }
    assert_eq!(search, base_search());
}

#[test]
fn search_path_lease_restores_on_drop() {
    let mut search = base_search();
    {
        let mut lease = SearchPathLease::acquire(&mut search);
        lease.install(base_search().with_appended([PathBuf::from("/staged")]));
    }
    assert_eq!(search, base_search());
}

#[test]
fn remove_tree_best_effort_clears_nested_directories() {
    let root = test_root("remove-tree");
    let tree = root.join("releases");
    write_file(&tree.join("1.1/start.boot"), "boot");
    write_file(&tree.join("1.1/nested/deeper/file"), "x");
    fs::create_dir_all(tree.join("empty/also-empty")).expect("must create dirs");
    write_file(&root.join("outside/keep"), "keep");
    #[cfg(unix)]
    std::os::unix::fs::symlink(root.join("outside"), tree.join("1.1/outside-link"))
        .expect("must create symlink");

    let mut report = CleanupReport::default();
    remove_tree_best_effort(&tree, &mut report);

    assert!(report.is_clean(), "{:?}", report.warnings);
    assert!(!tree.exists());
    assert!(root.join("outside/keep").is_file());
    assert!(report.removed.contains(&tree));

    let mut again = CleanupReport::default();
    remove_tree_best_effort(&tree, &mut again);
    assert!(again.is_clean());
    assert!(again.removed.is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn finalize_removes_only_recorded_artifacts() {
    let root = test_root("finalize");
    let layout = WorkspaceLayout::new(&root);
    let context = BuildContext::new(
        &ReleaseIdentity::new("myapp", "1.1"),
        &ReleaseIdentity::new("myapp", "1.0"),
    );
    write_file(&layout.relup_path(), "relup");
    write_file(&layout.staged_rel_path("myapp_1.1"), "rel");
    write_file(&layout.package_path("myapp_1.1"), "package");

    let mut ledger = ArtifactLedger::new();
    ledger.record(Artifact::StagedManifest);
    ledger.record(Artifact::Package);
    ledger.record(Artifact::LibTree);

    let mut search = base_search();
    let mut lease = SearchPathLease::acquire(&mut search);
    lease.install(SearchContext::new([PathBuf::from("/staged")]));
    let report = finalize_build(&layout, &context, &ledger, &mut lease, true);
    drop(lease);

    assert!(report.is_clean());
    assert!(report.search_path_restored);
    assert!(!layout.staged_rel_path("myapp_1.1").exists());
    assert!(layout.relup_path().exists());
    assert!(layout.package_path("myapp_1.1").exists());
    assert_eq!(search, base_search());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn artifact_ledger_iterates_in_removal_order() {
    let mut ledger = ArtifactLedger::new();
    assert!(ledger.is_empty());
    ledger.record(Artifact::LibTree);
    ledger.record(Artifact::Relup);
    ledger.record(Artifact::BootLink);
    ledger.record(Artifact::Relup);

    assert!(ledger.contains(Artifact::Relup));
    assert_eq!(
        ledger.iter().collect::<Vec<_>>(),
        vec![Artifact::BootLink, Artifact::Relup, Artifact::LibTree]
    );
}

#[test]
fn deterministic_tar_normalizes_headers() {
    let root = test_root("tar-headers");
    write_file(&root.join("lib/app/ebin/app.beam"), "beam");
    write_file(&root.join("releases/1.0/start.boot"), "boot");
    let archive = root.join("out.tar.gz");

    write_deterministic_tar_gz(&root, &PACKAGE_ROOTS, &archive).expect("must write archive");
    let entries = read_package(&archive);

    assert_eq!(
        entries
            .iter()
            .map(|entry| entry.path.trim_end_matches('/'))
            .collect::<Vec<_>>(),
        vec![
            "lib",
            "lib/app",
            "lib/app/ebin",
            "lib/app/ebin/app.beam",
            "releases",
            "releases/1.0",
            "releases/1.0/start.boot",
        ]
    );
    assert!(entries.iter().all(|entry| entry.mtime == 0 && entry.uid == 0));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn systools_command_passes_search_path_and_work_dir() {
    let work_dir = Path::new("/srv/build");
    let search = SearchContext::new([PathBuf::from("/old/releases/1.0"), PathBuf::from("/new/lib/a/ebin")]);
    let call = DifferCall {
        release: "myapp_1.1",
        work_dir,
        search: &search,
    };

    let command = build_systools_command(Path::new("/usr/bin/erl"), &call, "halt().");
    let args = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>();

    assert_eq!(command.get_program().to_string_lossy(), "/usr/bin/erl");
    assert_eq!(command.get_current_dir(), Some(work_dir));
    assert_eq!(
        args,
        vec![
            "-noshell",
            "-noinput",
            "-pa",
            "/old/releases/1.0",
            "-pa",
            "/new/lib/a/ebin",
            "-eval",
            "halt().",
        ]
    );
}

#[test]
fn systools_expressions_quote_release_names() {
    let relup = relup_expression("myapp_1.1", &["myapp".to_string()], &["myapp".to_string()]);
    assert!(relup.starts_with(
        "case systools:make_relup(\"myapp_1.1\", [\"myapp\"], [\"myapp\"], [silent]) of "
    ));
    assert!(relup.ends_with("end."));
    assert!(relup.contains("{error, Mod, Reason} -> io:format(standard_error"));

    assert!(script_expression("my\"app_1.1").contains("systools:make_script(\"my\\\"app_1.1\", [silent])"));
    assert!(tar_expression("myapp_1.1").contains("systools:make_tar(\"myapp_1.1\", [silent])"));
}

#[test]
fn erl_systools_uses_runner_for_each_call() {
    let systools = ErlSystools::new("erl");
    let search = base_search();
    let call = DifferCall {
        release: "myapp_1.1",
        work_dir: Path::new("/srv/build"),
        search: &search,
    };
    let mut observed = Vec::new();

    let result = systools.invoke_with_runner(&call, "halt(0).", |command| {
        observed = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        Err(DifferError::new("error", "boom"))
    });

    assert_eq!(result, Err(DifferError::new("error", "boom")));
    assert_eq!(observed.last().map(String::as_str), Some("halt(0)."));
    assert!(observed.contains(&BASE_ENTRY.to_string()));
}

#[test]
fn differ_errors_keep_reason_verbatim() {
    let err = run_differ_step(DifferStep::Relup, || {
        Err(DifferError::new("error", "{missing_module, foo}"))
    })
    .expect_err("must fail");

    assert!(matches!(
        err,
        BuildError::ExternalTool { step: DifferStep::Relup, ref reason } if reason == "{missing_module, foo}"
    ));
    assert!(run_differ_step(DifferStep::Tar, || Ok(())).is_ok());
}

#[test]
fn layout_paths_follow_release_convention() {
    let layout = WorkspaceLayout::new("/srv/build");
    assert_eq!(layout.releases_dir(), PathBuf::from("/srv/build/releases"));
    assert_eq!(
        layout.boot_link_path("1.1", "myapp"),
        PathBuf::from("/srv/build/releases/1.1/myapp.boot")
    );
    assert_eq!(
        layout.start_clean_boot_path("1.1"),
        PathBuf::from("/srv/build/releases/1.1/start_clean.boot")
    );
    assert_eq!(
        layout.staged_rel_path("myapp_1.1"),
        PathBuf::from("/srv/build/myapp_1.1.rel")
    );
    assert_eq!(
        layout.package_path("myapp_1.1"),
        PathBuf::from("/srv/build/myapp_1.1.tar.gz")
    );
    assert_eq!(
        layout.new_tree("myapp").rel_path("1.1", "myapp"),
        PathBuf::from("/srv/build/myapp/releases/1.1/myapp.rel")
    );
    assert_eq!(
        layout.old_tree(Path::new("/opt/myapp")).root(),
        Path::new("/opt/myapp")
    );
    assert_eq!(
        layout.old_tree(Path::new("../myapp")).root(),
        Path::new("/srv/build/../myapp")
    );
}
