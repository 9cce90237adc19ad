//! `stagehand check`: validate one package in isolation.

use std::path::Path;

use anyhow::{Result, bail};
use semver::Version;
use stagehand_config::Config;
use stagehand_loader::{Package, satisfies};
use stagehand_vfs::{GlobFactory, GlobOptions};

use crate::options::host_version;
use crate::theme::Theme;

pub(crate) fn check_package(config: &Config, path: &Path) -> Result<()> {
    let package = match Package::open(path) {
        Ok(package) => package,
        Err(e) => {
            println!("{}", Theme::error(&e.to_string()));
            bail!("{} is not a valid package", path.display());
        },
    };
    let host = host_version(config)?;
    let globs = GlobFactory::new(GlobOptions {
        allow_absolute: config.loader.allow_absolute_globs,
    });

    let manifest = package.manifest();
    println!(
        "{}",
        Theme::header(&format!("{} {}", manifest.display_name(), package.version()))
    );
    println!("{}", Theme::separator());
    println!("  guid:     {}", package.guid());
    println!("  requires: {}", manifest.require);
    for (guid, version) in &manifest.dependencies {
        println!("  depends:  {guid} {version}");
    }

    let problems = problems(&package, &host, globs);
    for (stage, entry) in manifest.assets.iter() {
        println!(
            "  {}",
            Theme::dimmed(&format!("{stage}: {} -> {}", entry.path, entry.loader))
        );
    }

    println!();
    if problems.is_empty() {
        println!("{}", Theme::success("Package is valid"));
        return Ok(());
    }
    for problem in &problems {
        println!("{}", Theme::warning(problem));
    }
    bail!("{} problem(s) found in {}", problems.len(), package.guid())
}

/// Problems visible without the rest of the package set: host version,
/// uncompilable globs and globs that match nothing.
fn problems(package: &Package, host: &Version, globs: GlobFactory) -> Vec<String> {
    let manifest = package.manifest();
    let mut problems = Vec::new();

    if !satisfies(host, &manifest.require) {
        problems.push(format!(
            "Requires host {}, running {host}",
            manifest.require
        ));
    }

    for (stage, entry) in manifest.assets.iter() {
        let glob = match globs.compile(&entry.path) {
            Ok(glob) => glob,
            Err(e) => {
                problems.push(format!("{stage}: {e}"));
                continue;
            },
        };
        match glob.matches(package.root()) {
            Ok(handles) if handles.is_empty() => {
                problems.push(format!("{stage}: '{}' matches nothing", entry.path));
            },
            Ok(_) => {},
            Err(e) => problems.push(format!("{stage}: {e}")),
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_package(dir: &Path, require: &str, assets: &str) {
        fs::create_dir_all(dir.join("text")).unwrap();
        fs::write(dir.join("text/a.txt"), "a").unwrap();
        fs::write(
            dir.join("manifest.json"),
            format!(
                r#"{{"guid":"demo","version":"1.0.0","require":"{require}","assets":{{{assets}}}}}"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn valid_package_has_no_problems() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "1.0.0",
            r#""setup":[{"path":"text/*.txt","loader":"demo:text"}]"#,
        );
        let package = Package::open(dir.path()).unwrap();
        let found = problems(&package, &Version::new(1, 2, 0), GlobFactory::default());
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn host_mismatch_and_empty_globs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "2.0.0",
            r#""setup":[{"path":"missing/*.txt","loader":"demo:text"}],
               "runtime":[{"path":"/text/a.txt","loader":"demo:text"}]"#,
        );
        let package = Package::open(dir.path()).unwrap();
        let found = problems(&package, &Version::new(1, 0, 0), GlobFactory::default());
        assert_eq!(found.len(), 3, "{found:?}");
        assert!(found[0].starts_with("Requires host 2.0.0"));
        assert!(found[1].contains("matches nothing"));
        assert!(found[2].starts_with("runtime:"));
    }

    #[test]
    fn missing_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_package(&Config::default(), dir.path()).is_err());
    }
}
