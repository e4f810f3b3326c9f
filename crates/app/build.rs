use std::process::Command;

/// Run `git` and return trimmed stdout, or `None` outside a checkout.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn main() {
    let version = match git(&["describe", "--always", "--dirty"]) {
        Some(desc) if !desc.is_empty() => desc,
        _ => "unknown".to_string(),
    };
    println!("cargo:rustc-env=QUERYDESK_GIT_HASH={version}");

    if let Some(git_dir) = git(&["rev-parse", "--git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        println!("cargo:rerun-if-changed={git_dir}/index");
    }
}
