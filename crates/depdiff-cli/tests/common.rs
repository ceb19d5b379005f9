#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use flate2::write::GzEncoder;
use flate2::Compression;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args([
            "-c",
            "user.name=depdiff",
            "-c",
            "user.email=depdiff@example.invalid",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn init_repo(root: &Path) {
    fs::create_dir_all(root).expect("create repo dir");
    git(root, &["init", "--quiet"]);
}

/// Write `files`, commit everything, and return the new commit id.
pub fn commit_files(root: &Path, files: &[(&str, &str)], message: &str) -> String {
    for (path, contents) in files {
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&target, contents).expect("write file");
    }
    git(root, &["add", "--all"]);
    git(root, &["commit", "--quiet", "-m", message]);
    git(root, &["rev-parse", "HEAD"])
}

pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("append tar entry");
    }
    let mut encoder = builder.into_inner().expect("finish tar");
    encoder.flush().expect("flush gzip");
    encoder.finish().expect("finish gzip")
}

pub fn hosted_entry(name: &str, version: &str) -> String {
    format!(
        "  {name}:\n    dependency: \"direct main\"\n    description:\n      name: {name}\n      url: \"https://pub.dartlang.org\"\n    source: hosted\n    version: \"{version}\"\n"
    )
}

pub fn git_entry(name: &str, url: &str, resolved_ref: &str) -> String {
    format!(
        "  {name}:\n    dependency: \"direct main\"\n    description:\n      path: \".\"\n      ref: main\n      resolved-ref: {resolved_ref}\n      url: \"{url}\"\n    source: git\n    version: \"0.0.1\"\n"
    )
}

pub fn sdk_entry(name: &str) -> String {
    format!(
        "  {name}:\n    dependency: \"direct main\"\n    description: flutter\n    source: sdk\n    version: \"0.0.0\"\n"
    )
}

pub fn lockfile(entries: &[String]) -> String {
    format!(
        "# Generated by pub\npackages:\n{}sdks:\n  dart: \">=3.0.0 <4.0.0\"\n",
        entries.concat()
    )
}
