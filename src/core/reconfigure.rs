// src/core/reconfigure.rs

use crate::constants::RECONFIGURE_FLAG;
use crate::core::argv::{
    ARGV_SEPARATOR, deduplicate_command_line_args, flag_name, prune_command_line_args,
};
use crate::core::cmake_var::shell_quote;
use crate::core::error::ConfigureResult;
use crate::core::project::ProjectIdentity;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The script file name for `arch`, e.g. `reconfigure-arch-linux-release.sh`.
pub fn reconfigure_file_name(arch: &str) -> String {
    format!("reconfigure-{}.sh", arch.replace(' ', "-").to_lowercase())
}

/// The argv a reconfigure run replays.
///
/// Ephemeral flags are pruned and duplicates removed. An explicit `--<ARCH_NAME>=<arch>`
/// is inserted when the arch came from somewhere other than the command line.
pub fn sanitized_argv(
    argv: &[String],
    ephemeral: &BTreeSet<String>,
    extra_argv: &[String],
    arch_flag: &str,
    arch: &str,
) -> ConfigureResult<Vec<String>> {
    let mut cl_args = prune_command_line_args(argv, ephemeral)?;
    cl_args = deduplicate_command_line_args(&cl_args);

    if !cl_args.iter().any(|arg| flag_name(arg) == arch_flag) {
        cl_args.insert(0, format!("{}={}", arch_flag, arch));
    }
    cl_args.push(RECONFIGURE_FLAG.to_string());
    if !extra_argv.is_empty() {
        cl_args.push(ARGV_SEPARATOR.to_string());
        cl_args.extend(extra_argv.iter().cloned());
    }
    Ok(cl_args)
}

/// Renders the POSIX shell script that replays `argv` with `executable`.
pub fn render_script(executable: &Path, project_dir: &Path, argv: &[String]) -> String {
    let mut command = vec![shell_quote(&executable.display().to_string())];
    command.extend(argv.iter().map(|arg| shell_quote(arg)));

    format!(
        "#!/usr/bin/env sh\n\
         # Generated by forgeconf. Re-runs configure with the options of the original run.\n\
         set -e\n\
         cd {}\n\
         exec {} \"$@\"\n",
        shell_quote(&project_dir.display().to_string()),
        command.join(" \\\n  ")
    )
}

/// Writes the reconfigure script into the arch directory and links it from the project dir.
pub fn write_script(
    project: &ProjectIdentity,
    arch: &str,
    script: &str,
) -> ConfigureResult<PathBuf> {
    let path = project.arch_dir(arch).join(reconfigure_file_name(arch));
    fs::write(&path, script)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;

        let link = project.project_dir.join(reconfigure_file_name(arch));
        let target = path.strip_prefix(&project.project_dir).unwrap_or(&path);
        if link.symlink_metadata().is_ok() {
            log::debug!("Symlink destination {} already exists", link.display());
        } else {
            log::debug!("Symlinking reconfigure script to {}", link.display());
            std::os::unix::fs::symlink(target, &link)?;
        }
    }

    log::info!("Wrote reconfigure script: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconfigure_file_name() {
        assert_eq!(reconfigure_file_name("Arch Linux Debug"), "reconfigure-arch-linux-debug.sh");
    }

    #[test]
    fn test_sanitized_argv_prunes_and_inserts_arch() {
        // --- Setup ---
        let input = argv(&["--with-clean", "--build-type=debug", "--with-cuda", "--build-type=release"]);
        let ephemeral: BTreeSet<String> = ["--with-clean".to_string(), "--reconfigure".to_string()].into();
        let tail = argv(&["-DFOO=1"]);

        // --- Execute ---
        let sanitized =
            sanitized_argv(&input, &ephemeral, &tail, "--DEMO_ARCH", "arch-linux").unwrap();

        // --- Assert ---
        assert_eq!(
            sanitized,
            argv(&[
                "--DEMO_ARCH=arch-linux",
                "--build-type=release",
                "--with-cuda",
                "--reconfigure",
                "--",
                "-DFOO=1",
            ])
        );
    }

    #[test]
    fn test_sanitized_argv_keeps_explicit_arch() {
        let input = argv(&["--DEMO_ARCH", "custom", "--reconfigure"]);
        let ephemeral: BTreeSet<String> = ["--reconfigure".to_string()].into();

        let sanitized = sanitized_argv(&input, &ephemeral, &[], "--DEMO_ARCH", "custom").unwrap();

        assert_eq!(sanitized, argv(&["--DEMO_ARCH", "custom", "--reconfigure"]));
    }

    #[test]
    fn test_sanitized_argv_ignores_flags_sharing_the_arch_prefix() {
        let input = argv(&["--DEMO_ARCHIVE=x"]);

        let sanitized =
            sanitized_argv(&input, &BTreeSet::new(), &[], "--DEMO_ARCH", "arch-linux").unwrap();

        assert_eq!(
            sanitized,
            argv(&["--DEMO_ARCH=arch-linux", "--DEMO_ARCHIVE=x", "--reconfigure"])
        );
    }

    #[test]
    fn test_script_replays_arguments() {
        let script = render_script(
            Path::new("/usr/bin/forgeconf"),
            Path::new("/src/demo"),
            &argv(&["--CFLAGS=-O2 -g", "--with-cuda"]),
        );
        assert!(script.starts_with("#!/usr/bin/env sh\n"));
        let exec_line: String = script
            .lines()
            .skip_while(|line| !line.starts_with("exec "))
            .map(|line| line.trim_end_matches('\\').trim())
            .collect::<Vec<_>>()
            .join(" ");
        let words = shlex::split(&exec_line).unwrap();
        assert_eq!(
            words,
            argv(&["exec", "/usr/bin/forgeconf", "--CFLAGS=-O2 -g", "--with-cuda", "$@"])
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_write_script_is_executable_and_linked() {
        use std::os::unix::fs::PermissionsExt;

        // --- Setup ---
        let dir = TempDir::new().unwrap();
        let project =
            ProjectIdentity::new("Demo", "DEMO_ARCH", "DEMO_DIR", dir.path(), dir.path().join("t.in"));
        fs::create_dir_all(project.arch_dir("arch-test")).unwrap();

        // --- Execute ---
        let path = write_script(&project, "arch-test", "#!/usr/bin/env sh\n").unwrap();

        // --- Assert ---
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        let link = dir.path().join("reconfigure-arch-test.sh");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(link).unwrap(), "#!/usr/bin/env sh\n");
    }
}
