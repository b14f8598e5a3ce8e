use git2::Repository;
use git2::Status;

/// Value reported when the build does not happen inside a git repository.
const UNKNOWN: &str = "unknown";

fn is_index_status(status: &Status) -> bool {
    status.intersects(
        Status::INDEX_DELETED
            | Status::INDEX_MODIFIED
            | Status::INDEX_NEW
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    )
}

fn is_workdir_status(status: &Status) -> bool {
    status.intersects(
        Status::WT_DELETED
            | Status::WT_MODIFIED
            | Status::WT_NEW
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE,
    )
}

fn main() {
    let repo = Repository::discover(".").ok();
    let hash = repo.as_ref().and_then(git_hash);
    let taint = repo.as_ref().and_then(git_taint);
    println!(
        "cargo:rustc-env=GIT_BUILD_HASH={}",
        hash.as_deref().unwrap_or(UNKNOWN)
    );
    println!(
        "cargo:rustc-env=GIT_BUILD_TAINT={}",
        taint.as_deref().unwrap_or(UNKNOWN)
    );
    println!("cargo:rerun-if-changed=.git/HEAD");
}

fn git_hash(repo: &Repository) -> Option<String> {
    let checkout = repo.revparse_single("HEAD").ok()?;
    Some(checkout.id().to_string())
}

fn git_taint(repo: &Repository) -> Option<String> {
    let mut index_changed = false;
    let mut workdir_changed = false;

    for entry in repo.statuses(None).ok()?.iter() {
        let status = entry.status();
        if is_index_status(&status) {
            index_changed = true;
        }
        if is_workdir_status(&status) {
            workdir_changed = true;
        }
    }

    let taint = match (index_changed, workdir_changed) {
        (true, true) => "index and working directory tainted",
        (true, false) => "index tainted",
        (false, true) => "working directory tainted",
        (false, false) => "not tainted",
    };
    Some(taint.to_string())
}
