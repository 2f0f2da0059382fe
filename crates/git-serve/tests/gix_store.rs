//! `ls-refs` against on-disk repositories created with the git executable.
//! Skipped when git is not installed.

use std::path::Path;
use std::process::Command;

use git_serve::pkt::{PKT_DELIM, PKT_FLUSH, Packet, PacketReader, encode_pkt_line};
use git_serve::{CapabilityRegistry, GixRefStore, RefStore, ServeContext, ServeOptions, serve};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "tests@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "tests@example.com")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 output").trim().to_owned()
}

fn init_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir, &["commit", "-q", "--allow-empty", "-m", "first"]);
    git(dir, &["branch", "dev"]);
    git(dir, &["tag", "light"]);
    git(dir, &["tag", "-a", "v1", "-m", "release v1"]);
    git(dir, &["symbolic-ref", "refs/heads/alias", "refs/heads/main"]);
    temp_dir
}

fn ls_refs(store: &dyn RefStore, args: &[&str]) -> Vec<String> {
    let ctx = ServeContext::new(store);
    let registry = CapabilityRegistry::standard();

    let mut input = encode_pkt_line(b"command=ls-refs\n");
    input.extend_from_slice(PKT_DELIM);
    for arg in args {
        input.extend_from_slice(&encode_pkt_line(format!("{arg}\n").as_bytes()));
    }
    input.extend_from_slice(PKT_FLUSH);

    let mut out = Vec::new();
    let options = ServeOptions { advertise_capabilities: false, stateless_rpc: true };
    serve(&ctx, &registry, options, &input[..], &mut out).expect("ls-refs succeeds");

    let mut reader = PacketReader::new(&out[..]);
    let mut lines = Vec::new();
    loop {
        match reader.read().expect("well-formed response") {
            Packet::Line(line) => lines.push(line),
            Packet::Flush => return lines,
            other => panic!("unexpected packet {other:?}"),
        }
    }
}

#[test]
fn lists_repository_refs_with_symrefs_and_peeling() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let repo = init_repo();
    let dir = repo.path();
    let commit = git(dir, &["rev-parse", "HEAD"]);
    let tag = git(dir, &["rev-parse", "refs/tags/v1"]);
    assert_ne!(commit, tag);

    let store = GixRefStore::open(dir, None).expect("open repository");
    assert_eq!(
        ls_refs(&store, &["symrefs", "peel"]),
        [
            format!("{commit} HEAD refs/heads/main"),
            format!("{commit} refs/heads/alias refs/heads/main"),
            format!("{commit} refs/heads/dev"),
            format!("{commit} refs/heads/main"),
            format!("{commit} refs/tags/light"),
            format!("{tag} refs/tags/v1"),
            format!("{commit} refs/tags/v1^{{}}"),
        ]
    );

    assert_eq!(
        ls_refs(&store, &["ref-pattern dev", "ref-pattern v1"]),
        [format!("{commit} refs/heads/dev"), format!("{tag} refs/tags/v1")]
    );
}

#[test]
fn namespace_limits_and_strips_names() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let repo = init_repo();
    let dir = repo.path();
    let commit = git(dir, &["rev-parse", "HEAD"]);
    git(dir, &["update-ref", "refs/namespaces/site/refs/heads/trunk", &commit]);
    git(
        dir,
        &["symbolic-ref", "refs/namespaces/site/HEAD", "refs/namespaces/site/refs/heads/trunk"],
    );

    let store = GixRefStore::open(dir, Some("site")).expect("open repository");
    assert_eq!(
        ls_refs(&store, &["symrefs"]),
        [
            format!("{commit} HEAD refs/namespaces/site/refs/heads/trunk"),
            format!("{commit} refs/heads/trunk"),
        ]
    );
}

#[test]
fn unborn_head_lists_nothing() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    git(temp_dir.path(), &["init", "-q"]);

    let store = GixRefStore::open(temp_dir.path(), None).expect("open repository");
    assert!(ls_refs(&store, &["symrefs", "peel"]).is_empty());
}
