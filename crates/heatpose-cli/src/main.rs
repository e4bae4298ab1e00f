//! heatpose CLI: decode pose heatmaps and score keypoint predictions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use heatpose::blur::{gaussian_kernel_1d, kernel_for_sigma, sigma_for_kernel};
use heatpose::metrics::{keypoint_auc, keypoint_epe, keypoint_pck_accuracy};
use heatpose::{
    heatmaps_from_shape_vec, CenterScale, DecodeConfig, Decoder, KeypointPrediction,
    PckAccuracy, RefineMethod, TargetType,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "heatpose")]
#[command(about = "Decode top-down pose heatmaps into keypoints and evaluate PCK/AUC/EPE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a heatmap batch (JSON) into image-space keypoints.
    Decode(CliDecodeArgs),

    /// Compare predicted keypoints against ground truth.
    Evaluate(CliEvaluateArgs),

    /// Print the Gaussian kernel used for a given blur size.
    KernelInfo {
        /// Odd kernel size.
        #[arg(long, default_value = "11")]
        kernel: usize,

        /// Also report the kernel size matching this target sigma.
        #[arg(long)]
        sigma: Option<f64>,
    },
}

#[derive(Debug, Clone, Args)]
struct CliDecodeArgs {
    /// Heatmap batch: `{ "shape": [N,K,H,W], "data": [...], "center_scales": [...] }`.
    #[arg(long)]
    input: PathBuf,

    /// Path to write decoded keypoints (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Decode configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sub-pixel refinement method.
    #[arg(long, value_enum)]
    refine: Option<RefineMethodArg>,

    /// Gaussian kernel size for Taylor refinement and combined targets.
    #[arg(long)]
    kernel: Option<usize>,

    /// Use the unbiased (UDP) coordinate transform.
    #[arg(long)]
    udp: bool,

    /// Skip sub-pixel refinement.
    #[arg(long)]
    no_post_process: bool,

    /// Network output layout.
    #[arg(long, value_enum)]
    target_type: Option<TargetTypeArg>,
}

#[derive(Debug, Clone, Args)]
struct CliEvaluateArgs {
    /// Predicted keypoints, as written by `decode`.
    #[arg(long)]
    pred: PathBuf,

    /// Ground-truth keypoints, same layout; `score <= 0` marks a missing
    /// keypoint.
    #[arg(long)]
    gt: PathBuf,

    /// PCK threshold on the normalized distance.
    #[arg(long, default_value = "0.5")]
    thr: f32,

    /// PCK normalization in pixels (both axes). Defaults to the AUC factor.
    #[arg(long)]
    pck_normalize: Option<f32>,

    /// AUC normalization in pixels.
    #[arg(long, default_value = "30.0")]
    auc_normalize: f32,

    /// Number of AUC threshold steps.
    #[arg(long, default_value = "20")]
    auc_steps: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RefineMethodArg {
    Shift,
    Taylor,
    Dark,
}

impl RefineMethodArg {
    fn to_core(self) -> RefineMethod {
        match self {
            Self::Shift => RefineMethod::Shift,
            Self::Taylor => RefineMethod::Taylor,
            Self::Dark => RefineMethod::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetTypeArg {
    GaussianHeatmap,
    CombinedTarget,
}

impl TargetTypeArg {
    fn to_core(self) -> TargetType {
        match self {
            Self::GaussianHeatmap => TargetType::GaussianHeatmap,
            Self::CombinedTarget => TargetType::CombinedTarget,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HeatmapInput {
    shape: Vec<usize>,
    data: Vec<f32>,
    center_scales: Vec<CenterScale>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeypointFile {
    instances: Vec<Vec<KeypointPrediction>>,
}

#[derive(Debug, Serialize)]
struct EvaluationReport {
    thr: f32,
    pck: PckAccuracy,
    auc: f32,
    epe: Option<f32>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode(args) => run_decode(&args),
        Commands::Evaluate(args) => run_evaluate(&args),
        Commands::KernelInfo { kernel, sigma } => run_kernel_info(kernel, sigma),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| -> CliError { format!("failed to read {}: {}", path.display(), e).into() })?;
    Ok(serde_json::from_str(&text)?)
}

// ── decode ─────────────────────────────────────────────────────────────

impl CliDecodeArgs {
    fn to_config(&self) -> CliResult<DecodeConfig> {
        let mut config = match &self.config {
            Some(path) => DecodeConfig::from_json_file(path)?,
            None => DecodeConfig::default(),
        };
        if let Some(refine) = self.refine {
            config.refine = refine.to_core();
        }
        if let Some(kernel) = self.kernel {
            config.blur_kernel = kernel;
        }
        if self.udp {
            config.use_udp = true;
        }
        if self.no_post_process {
            config.post_process = false;
        }
        if let Some(target) = self.target_type {
            config.target_type = target.to_core();
        }
        Ok(config)
    }
}

fn run_decode(args: &CliDecodeArgs) -> CliResult<()> {
    tracing::info!("Loading heatmaps: {}", args.input.display());
    let input: HeatmapInput = read_json(&args.input)?;
    let heatmaps = heatmaps_from_shape_vec(&input.shape, input.data)?;
    let (n, k, h, w) = heatmaps.dim();
    tracing::info!("Heatmaps: {} instances x {} channels, {}x{}", n, k, w, h);

    let decoder = Decoder::new(args.to_config()?)?;
    let decoded = decoder.decode(heatmaps.view(), &input.center_scales)?;

    let instances = decoded.predictions();
    let n_found: usize = instances
        .iter()
        .map(|kps| kps.iter().filter(|p| p.score > 0.0).count())
        .sum();
    tracing::info!(
        "Decoded {} keypoints ({} with positive score)",
        n * decoded.num_keypoints(),
        n_found
    );

    let json = serde_json::to_string_pretty(&KeypointFile { instances })?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

// ── evaluate ───────────────────────────────────────────────────────────

/// `[N, K, 2]` coordinates and `[N, K]` positive-score mask.
fn to_arrays(file: &KeypointFile) -> CliResult<(Array3<f32>, Array2<bool>)> {
    let n = file.instances.len();
    let k = file.instances.first().map_or(0, |kps| kps.len());
    if file.instances.iter().any(|kps| kps.len() != k) {
        return Err("every instance must have the same number of keypoints".into());
    }
    let coords = Array3::from_shape_fn((n, k, 2), |(i, j, c)| {
        let p = &file.instances[i][j];
        if c == 0 {
            p.x
        } else {
            p.y
        }
    });
    let mask = Array2::from_shape_fn((n, k), |(i, j)| file.instances[i][j].score > 0.0);
    Ok((coords, mask))
}

fn run_evaluate(args: &CliEvaluateArgs) -> CliResult<()> {
    let pred: KeypointFile = read_json(&args.pred)?;
    let gt: KeypointFile = read_json(&args.gt)?;
    let report = evaluate(&pred, &gt, args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Score `pred` against `gt`. A keypoint counts only when both files give it
/// a positive score.
fn evaluate(
    pred: &KeypointFile,
    gt: &KeypointFile,
    args: &CliEvaluateArgs,
) -> CliResult<EvaluationReport> {
    let (pred, pred_mask) = to_arrays(pred)?;
    let (gt, gt_mask) = to_arrays(gt)?;
    if pred.dim() != gt.dim() {
        return Err(format!(
            "prediction shape {:?} does not match ground truth {:?}",
            pred.shape(),
            gt.shape()
        )
        .into());
    }
    let mask = &gt_mask & &pred_mask;
    tracing::info!(
        "Evaluating {} instances x {} keypoints ({} visible, {} predicted)",
        gt.shape()[0],
        gt.shape()[1],
        gt_mask.iter().filter(|v| **v).count(),
        mask.iter().filter(|v| **v).count()
    );

    let pck_norm = args.pck_normalize.unwrap_or(args.auc_normalize);
    let normalize = Array2::<f32>::from_elem((gt.shape()[0], 2), pck_norm);
    let pck = keypoint_pck_accuracy(pred.view(), gt.view(), mask.view(), args.thr, normalize.view())?;
    let auc = keypoint_auc(pred.view(), gt.view(), mask.view(), args.auc_normalize, args.auc_steps)?;
    let epe = keypoint_epe(pred.view(), gt.view(), mask.view())?;
    if epe.is_none() {
        tracing::warn!("no keypoint is both visible and predicted; EPE is undefined");
    }

    Ok(EvaluationReport {
        thr: args.thr,
        pck,
        auc,
        epe,
    })
}

// ── kernel-info ────────────────────────────────────────────────────────

fn run_kernel_info(kernel: usize, sigma: Option<f64>) -> CliResult<()> {
    let weights = gaussian_kernel_1d(kernel, 0.0)?;
    println!("heatpose gaussian kernel");
    println!("  size:    {}", kernel);
    println!("  sigma:   {:.4}", sigma_for_kernel(kernel));
    let formatted: Vec<String> = weights.iter().map(|w| format!("{:.6}", w)).collect();
    println!("  weights: [{}]", formatted.join(", "));
    if let Some(s) = sigma {
        println!("  kernel for sigma {}: {}", s, kernel_for_sigma(s));
    }
    Ok(())
}
