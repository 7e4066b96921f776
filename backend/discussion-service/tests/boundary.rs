use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if let Ok(read_dir) = fs::read_dir(&dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
                    files.push(path);
                }
            }
        }
    }
    files
}

#[test]
fn services_reach_storage_only_through_the_store_trait() {
    let services_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("services");
    let mut offenders = Vec::new();
    for file in collect_rs_files(&services_root) {
        let contents = fs::read_to_string(&file).unwrap_or_default();
        if contents.contains("sqlx::") || contents.contains("PgPool") {
            offenders.push(file.to_string_lossy().to_string());
        }
    }

    if !offenders.is_empty() {
        panic!(
            "Services must go through DiscussionStore, not the database. Offenders: {:?}",
            offenders
        );
    }
}
