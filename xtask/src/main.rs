use anyhow::{bail, ensure, Context as _};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::{env, fs};

const PROTO_PACKAGE: &str = "google.iam.credentials.v1";

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);

    match (args.next().as_deref(), args.next().as_deref(), args.next()) {
        (Some("gen"), Some("iam-credentials"), None) => gen_iam_credentials_protos(),
        (Some("-h") | Some("--help") | None, _, _) => {
            eprintln!("{}", usage_text());
            Ok(())
        }
        (Some(cmd), Some(target), extra) => {
            if extra.is_some() {
                bail!("too many arguments\n\n{}", usage_text());
            }
            bail!("unknown command: {cmd} {target}\n\n{}", usage_text());
        }
        _ => bail!("{}", usage_text()),
    }
}

fn usage_text() -> &'static str {
    "Usage:
  cargo run -p xtask -- gen iam-credentials"
}

fn repo_root() -> anyhow::Result<PathBuf> {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .context("xtask must be in a workspace with a parent directory")
        .map(Path::to_path_buf)
}

fn gen_iam_credentials_protos() -> anyhow::Result<()> {
    let crate_dir = repo_root()?.join("iam-credentials");
    let proto_root = crate_dir.join("proto");
    let package_dir = proto_root.join("google/iam/credentials/v1");

    let proto_files = ["common.proto", "iamcredentials.proto"].map(|name| package_dir.join(name));
    for file in &proto_files {
        ensure!(file.exists(), "proto file not found: {}", file.display());
    }

    let out_dir = crate_dir.join("src/pb");
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;

    // Generate into a clean temp dir so stale files are never picked up.
    let tmp_dir = out_dir.join(".tmp");
    reset_dir(&tmp_dir)?;

    let mut proto_config = prost_build::Config::new();
    proto_config.bytes(["."]);

    let fds = protox::compile(&proto_files, [&proto_root])
        .context("failed to compile IAM Credentials protos")?;

    // Messages only: calls go through the transport's own stubs.
    tonic_prost_build::configure()
        .build_client(false)
        .build_server(false)
        .out_dir(&tmp_dir)
        .compile_fds_with_config(fds, proto_config)
        .context("failed to generate IAM Credentials bindings")?;

    let name = format!("{PROTO_PACKAGE}.rs");
    let generated = tmp_dir.join(&name);
    ensure!(
        generated.exists(),
        "expected generated file not found: {}",
        generated.display()
    );

    let final_path = out_dir.join(&name);
    replace_file(&generated, &final_path)?;
    fs::remove_dir_all(&tmp_dir)
        .with_context(|| format!("failed to remove temp dir {}", tmp_dir.display()))?;

    let _ = Command::new("rustfmt")
        .args(["--edition", "2021"])
        .arg(&final_path)
        .status();
    println!("Generated {}", final_path.display());
    Ok(())
}

fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("failed to remove {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}

fn replace_file(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if dst.exists() {
        fs::remove_file(dst)
            .with_context(|| format!("failed removing existing {}", dst.display()))?;
    }

    fs::rename(src, dst).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            src.display(),
            dst.display()
        )
    })
}
