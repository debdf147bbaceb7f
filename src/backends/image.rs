//! Text-to-image and image-to-image via DiffusionKit or mflux.
//!
//! The first tool found on `PATH` wins; DiffusionKit is preferred because it
//! honours negative prompts.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

use super::process::{find_executable, ToolCommand};
use super::{GeneratedImages, ImageBackend, ImageModel};
use crate::config_loader::Settings;
use crate::error::{BackendError, Result};
use crate::media::{decode_base64, encode_base64};
use crate::protocol::{GenerateImageParams, Img2ImgParams};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

lazy_static! {
    static ref MODEL_NAME: Regex = Regex::new(r"(?i)diffusion|flux|sd").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffusionTool {
    DiffusionKit { binary: PathBuf, model: String },
    Mflux { binary: PathBuf, model: String },
}

impl DiffusionTool {
    /// Pick the first installed toolchain.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        if let Some(binary) = find_executable(&settings.diffusionkit_binary) {
            return Ok(Self::DiffusionKit {
                binary,
                model: settings.diffusionkit_model.clone(),
            });
        }
        if let Some(binary) = find_executable(&settings.mflux_binary) {
            return Ok(Self::Mflux {
                binary,
                model: settings.mflux_model.clone(),
            });
        }
        Err(BackendError::no_toolchain(
            "diffusion tool",
            "diffusionkit or mflux",
            "pip install diffusionkit\n  pip install mflux",
        ))
    }

    fn binary(&self) -> &Path {
        match self {
            Self::DiffusionKit { binary, .. } | Self::Mflux { binary, .. } => binary,
        }
    }
}

/// A single diffusion run, independent of which tool executes it.
struct DiffusionJob<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    steps: u32,
    cfg_scale: f64,
    size: Option<(u32, u32)>,
    seed: i64,
    init: Option<(&'a Path, f64)>,
    output: &'a Path,
}

/// Model listing works without any toolchain; the diffusion tool is
/// looked up on the first generation and kept once found.
pub struct ToolImageBackend {
    tool: OnceLock<DiffusionTool>,
    settings: Settings,
    model_dirs: Vec<PathBuf>,
    timeout_secs: u64,
}

impl ToolImageBackend {
    pub fn new(tool: DiffusionTool, model_dirs: Vec<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            tool: OnceLock::from(tool),
            settings: Settings::default(),
            model_dirs,
            timeout_secs,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tool: OnceLock::new(),
            settings: settings.clone(),
            model_dirs: settings.image_model_paths(),
            timeout_secs: settings.backend_timeout_secs,
        }
    }

    fn tool(&self) -> Result<&DiffusionTool> {
        if let Some(tool) = self.tool.get() {
            return Ok(tool);
        }
        let resolved = DiffusionTool::resolve(&self.settings)?;
        info!(tool = ?resolved, "diffusion toolchain found");
        Ok(self.tool.get_or_init(|| resolved))
    }

    fn command(&self, tool: &DiffusionTool, job: &DiffusionJob<'_>) -> ToolCommand {
        let cmd = ToolCommand::new(tool.binary()).timeout_secs(self.timeout_secs);
        match tool {
            DiffusionTool::DiffusionKit { model, .. } => {
                let mut cmd = cmd
                    .opt("--model-version", model)
                    .opt("--prompt", job.prompt)
                    .opt("--steps", job.steps.to_string())
                    .opt("--cfg", job.cfg_scale.to_string())
                    .opt("--seed", job.seed.to_string())
                    .opt("--output-path", job.output);
                if !job.negative_prompt.is_empty() {
                    cmd = cmd.opt("--negative_prompt", job.negative_prompt);
                }
                if let Some((width, height)) = job.size {
                    cmd = cmd
                        .opt("--width", width.to_string())
                        .opt("--height", height.to_string());
                }
                if let Some((path, strength)) = job.init {
                    cmd = cmd
                        .opt("--image-path", path)
                        .opt("--denoise", strength.to_string());
                }
                cmd
            }
            DiffusionTool::Mflux { model, .. } => {
                if !job.negative_prompt.is_empty() {
                    debug!("mflux does not support negative prompts; ignoring");
                }
                let mut cmd = cmd
                    .opt("--model", model)
                    .opt("--prompt", job.prompt)
                    .opt("--steps", job.steps.to_string())
                    .opt("--guidance", job.cfg_scale.to_string())
                    .opt("--seed", job.seed.to_string())
                    .opt("--output", job.output);
                if let Some((width, height)) = job.size {
                    cmd = cmd
                        .opt("--width", width.to_string())
                        .opt("--height", height.to_string());
                }
                if let Some((path, strength)) = job.init {
                    cmd = cmd
                        .opt("--init-image-path", path)
                        .opt("--init-image-strength", strength.to_string());
                }
                cmd
            }
        }
    }

    fn run(&self, job: DiffusionJob<'_>) -> Result<GeneratedImages> {
        let seed = job.seed;
        let tool = self.tool()?;
        self.command(tool, &job).run()?;

        let png = std::fs::read(job.output).map_err(|e| {
            BackendError::InvalidOutput(format!("diffusion tool wrote no image: {}", e))
        })?;
        if !png.starts_with(PNG_SIGNATURE) {
            return Err(BackendError::InvalidOutput(
                "diffusion tool output is not a PNG".to_string(),
            ));
        }

        Ok(GeneratedImages {
            images: vec![encode_base64(&png)],
            seed,
        })
    }
}

impl ImageBackend for ToolImageBackend {
    fn generate(&self, params: &GenerateImageParams) -> Result<GeneratedImages> {
        let seed = resolve_seed(params.seed);
        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join("image.png");

        info!(seed, steps = params.steps, "generating image");
        self.run(DiffusionJob {
            prompt: &params.prompt,
            negative_prompt: &params.negative_prompt,
            steps: params.steps,
            cfg_scale: params.cfg_scale,
            size: Some((params.width, params.height)),
            seed,
            init: None,
            output: &output,
        })
    }

    fn img2img(&self, params: &Img2ImgParams) -> Result<GeneratedImages> {
        if params.init_image.trim().is_empty() {
            return Err(BackendError::InvalidInput(
                "init_image is required for img2img".to_string(),
            ));
        }
        let init_bytes = decode_base64(&params.init_image)?;

        let seed = resolve_seed(params.seed);
        let workdir = tempfile::tempdir()?;
        let init_path = workdir.path().join("init.png");
        let output = workdir.path().join("image.png");
        std::fs::write(&init_path, init_bytes)?;

        info!(seed, strength = params.denoising_strength, "running img2img");
        self.run(DiffusionJob {
            prompt: &params.prompt,
            negative_prompt: "",
            steps: params.steps,
            cfg_scale: params.cfg_scale,
            size: None,
            seed,
            init: Some((&init_path, params.denoising_strength)),
            output: &output,
        })
    }

    fn list_models(&self) -> Result<Vec<ImageModel>> {
        Ok(scan_model_dirs(&self.model_dirs))
    }
}

/// Replace the -1 sentinel with a random seed in `[0, 2^31 - 1]`.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed == -1 {
        rand::thread_rng().gen_range(0..=i32::MAX as i64)
    } else {
        seed
    }
}

/// Direct children of `dirs` that look like diffusion checkpoints, sorted by name.
pub fn scan_model_dirs(dirs: &[PathBuf]) -> Vec<ImageModel> {
    let mut models = Vec::new();

    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if MODEL_NAME.is_match(&name) {
                models.push(ImageModel {
                    path: entry.path().to_string_lossy().into_owned(),
                    name,
                });
            }
        }
    }

    models.sort_by(|a, b| a.name.cmp(&b.name).then(a.path.cmp(&b.path)));
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testutil::{arg_after, copy_to_flag, fake_tool, recorded_args, RECORD_ARGS};
    use tempfile::tempdir;

    fn write_png(dir: &Path) -> PathBuf {
        let path = dir.join("fixture.png");
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(b"fake image body");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn diffusionkit(dir: &Path) -> ToolImageBackend {
        let png = write_png(dir);
        let script = format!("{}\n{}", RECORD_ARGS, copy_to_flag("--output-path", &png));
        let binary = fake_tool(dir, "diffusionkit-cli", &script);
        ToolImageBackend::new(
            DiffusionTool::DiffusionKit {
                binary,
                model: "sd3".to_string(),
            },
            Vec::new(),
            0,
        )
    }

    #[test]
    fn test_resolve_seed() {
        assert_eq!(resolve_seed(1234), 1234);
        for _ in 0..100 {
            let seed = resolve_seed(-1);
            assert!((0..=i32::MAX as i64).contains(&seed));
        }
    }

    #[test]
    fn test_generate_passes_parameters() {
        let dir = tempdir().unwrap();
        let backend = diffusionkit(dir.path());

        let params = GenerateImageParams {
            prompt: "a lighthouse at dusk".to_string(),
            negative_prompt: "blurry".to_string(),
            seed: 77,
            ..GenerateImageParams::default()
        };
        let result = backend.generate(&params).unwrap();

        assert_eq!(result.seed, 77);
        assert_eq!(result.images.len(), 1);
        assert!(decode_base64(&result.images[0]).unwrap().starts_with(PNG_SIGNATURE));

        let args = recorded_args(dir.path());
        assert_eq!(arg_after(&args, "--prompt"), Some("a lighthouse at dusk"));
        assert_eq!(arg_after(&args, "--negative_prompt"), Some("blurry"));
        assert_eq!(arg_after(&args, "--steps"), Some("20"));
        assert_eq!(arg_after(&args, "--cfg"), Some("7"));
        assert_eq!(arg_after(&args, "--width"), Some("512"));
        assert_eq!(arg_after(&args, "--seed"), Some("77"));
        assert_eq!(arg_after(&args, "--model-version"), Some("sd3"));
    }

    #[test]
    fn test_img2img_writes_init_image() {
        let dir = tempdir().unwrap();
        let backend = diffusionkit(dir.path());

        let params = Img2ImgParams {
            prompt: "watercolor".to_string(),
            init_image: encode_base64(PNG_SIGNATURE),
            seed: 5,
            ..Img2ImgParams::default()
        };
        let result = backend.img2img(&params).unwrap();
        assert_eq!(result.seed, 5);

        let args = recorded_args(dir.path());
        assert_eq!(arg_after(&args, "--denoise"), Some("0.75"));
        assert!(arg_after(&args, "--image-path").unwrap().ends_with("init.png"));
        assert!(arg_after(&args, "--width").is_none());
    }

    #[test]
    fn test_img2img_requires_init_image() {
        let dir = tempdir().unwrap();
        let backend = diffusionkit(dir.path());
        let err = backend.img2img(&Img2ImgParams::default()).unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn test_mflux_flags() {
        let dir = tempdir().unwrap();
        let png = write_png(dir.path());
        let script = format!("{}\n{}", RECORD_ARGS, copy_to_flag("--output", &png));
        let binary = fake_tool(dir.path(), "mflux-generate", &script);
        let backend = ToolImageBackend::new(
            DiffusionTool::Mflux {
                binary,
                model: "schnell".to_string(),
            },
            Vec::new(),
            0,
        );

        backend
            .generate(&GenerateImageParams {
                cfg_scale: 3.5,
                seed: 1,
                ..GenerateImageParams::default()
            })
            .unwrap();

        let args = recorded_args(dir.path());
        assert_eq!(arg_after(&args, "--model"), Some("schnell"));
        assert_eq!(arg_after(&args, "--guidance"), Some("3.5"));
        assert!(!args.iter().any(|a| a == "--negative_prompt"));
    }

    #[test]
    fn test_rejects_non_png_output() {
        let dir = tempdir().unwrap();
        let script = r#"while [ $# -gt 0 ]; do if [ "$1" = "--output-path" ]; then echo nope > "$2"; fi; shift; done"#;
        let binary = fake_tool(dir.path(), "diffusionkit-cli", script);
        let backend = ToolImageBackend::new(
            DiffusionTool::DiffusionKit {
                binary,
                model: "sd3".to_string(),
            },
            Vec::new(),
            0,
        );
        let err = backend.generate(&GenerateImageParams::default()).unwrap_err();
        assert!(matches!(err, BackendError::InvalidOutput(_)));
    }

    #[test]
    fn test_tool_failure_surfaces_stderr() {
        let dir = tempdir().unwrap();
        let binary = fake_tool(dir.path(), "diffusionkit-cli", "echo 'out of memory' >&2; exit 1");
        let backend = ToolImageBackend::new(
            DiffusionTool::DiffusionKit {
                binary,
                model: "sd3".to_string(),
            },
            Vec::new(),
            0,
        );
        let err = backend.generate(&GenerateImageParams::default()).unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_resolve_prefers_diffusionkit() {
        let dir = tempdir().unwrap();
        let dk = fake_tool(dir.path(), "dk", "exit 0");
        let mf = fake_tool(dir.path(), "mf", "exit 0");
        let settings = Settings {
            diffusionkit_binary: dk.to_string_lossy().into_owned(),
            mflux_binary: mf.to_string_lossy().into_owned(),
            ..Settings::default()
        };
        assert!(matches!(
            DiffusionTool::resolve(&settings).unwrap(),
            DiffusionTool::DiffusionKit { .. }
        ));

        let settings = Settings {
            diffusionkit_binary: dir.path().join("missing").to_string_lossy().into_owned(),
            ..settings
        };
        assert!(matches!(
            DiffusionTool::resolve(&settings).unwrap(),
            DiffusionTool::Mflux { .. }
        ));
    }

    #[test]
    fn test_resolve_reports_install_hint() {
        let settings = Settings {
            diffusionkit_binary: "/nonexistent/diffusionkit-cli".to_string(),
            mflux_binary: "/nonexistent/mflux-generate".to_string(),
            ..Settings::default()
        };
        let err = DiffusionTool::resolve(&settings).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No MLX diffusion tool found. Install diffusionkit or mflux:\n  pip install diffusionkit\n  pip install mflux"
        );
    }

    fn without_toolchain(model_dir: &Path) -> Settings {
        Settings {
            diffusionkit_binary: "/nonexistent/diffusionkit-cli".to_string(),
            mflux_binary: "/nonexistent/mflux-generate".to_string(),
            image_model_dirs: vec![model_dir.to_string_lossy().into_owned()],
            ..Settings::default()
        }
    }

    #[test]
    fn test_list_models_without_toolchain() {
        let models = tempdir().unwrap();
        std::fs::create_dir(models.path().join("stable-diffusion-v1-5")).unwrap();
        let backend = ToolImageBackend::from_settings(&without_toolchain(models.path()));

        let found = backend.list_models().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "stable-diffusion-v1-5");

        let err = backend.generate(&GenerateImageParams::default()).unwrap_err();
        assert!(matches!(err, BackendError::NoToolchain { .. }));
    }

    #[test]
    fn test_toolchain_found_after_install() {
        let dir = tempdir().unwrap();
        let mut settings = without_toolchain(dir.path());
        let png = write_png(dir.path());
        let mflux = dir.path().join("mflux-generate");
        settings.mflux_binary = mflux.to_string_lossy().into_owned();
        let backend = ToolImageBackend::from_settings(&settings);

        assert!(backend.generate(&GenerateImageParams::default()).is_err());

        let script = format!("{}\n{}", RECORD_ARGS, copy_to_flag("--output", &png));
        fake_tool(dir.path(), "mflux-generate", &script);
        let result = backend
            .generate(&GenerateImageParams {
                seed: 3,
                ..GenerateImageParams::default()
            })
            .unwrap();
        assert_eq!(result.seed, 3);
        assert_eq!(arg_after(&recorded_args(dir.path()), "--model"), Some("schnell"));
    }

    #[test]
    fn test_scan_model_dirs() {
        let hub = tempdir().unwrap();
        let models = tempdir().unwrap();
        for name in [
            "models--stabilityai--stable-diffusion-xl",
            "models--openai--whisper-base",
            "FLUX.1-schnell",
        ] {
            std::fs::create_dir(hub.path().join(name)).unwrap();
        }
        std::fs::write(models.path().join("my-SD-finetune.safetensors"), b"").unwrap();
        std::fs::write(models.path().join("notes.txt"), b"").unwrap();

        let found = scan_model_dirs(&[
            hub.path().to_path_buf(),
            PathBuf::from("/nonexistent/studiod/models"),
            models.path().to_path_buf(),
        ]);
        let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "FLUX.1-schnell",
                "models--stabilityai--stable-diffusion-xl",
                "my-SD-finetune.safetensors",
            ]
        );
        assert!(found[0].path.ends_with("FLUX.1-schnell"));
    }
}
