// Image build commands for the default lifecycle

use std::path::Path;

use crate::exec::CommandSpec;

/// Build and push remotely with Cloud Build
pub(crate) fn cloud_build_command(app_path: &Path, project_id: &str, image_tag: &str) -> CommandSpec {
    CommandSpec::new("gcloud")
        .args(["builds", "submit"])
        .arg(format!("--project={}", project_id))
        .arg(format!("--tag={}", image_tag))
        .arg("--quiet")
        .arg(".")
        .current_dir(app_path)
}

/// Build locally with Docker or Podman from the sample's Dockerfile
pub(crate) fn docker_build_command(
    app_path: &Path,
    container_cli: &str,
    image_tag: &str,
    build_args: &[String],
) -> CommandSpec {
    let mut cmd = CommandSpec::new(container_cli)
        .arg("build")
        .arg("-t")
        .arg(image_tag)
        // Cloud Run only runs amd64 images
        .arg("--platform")
        .arg("linux/amd64");

    for build_arg in build_args {
        cmd = cmd.arg("--build-arg").arg(build_arg);
    }

    cmd.arg(".").current_dir(app_path)
}

/// Push a locally built image to the registry
pub(crate) fn docker_push_command(container_cli: &str, image_tag: &str) -> CommandSpec {
    CommandSpec::new(container_cli).arg("push").arg(image_tag)
}
