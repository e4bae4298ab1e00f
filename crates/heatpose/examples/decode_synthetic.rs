use heatpose::codec::{Codec, CodecConfig, KeypointCodec, MsraHeatmapConfig};
use heatpose::{CenterScale, DecodeConfig, Decoder, RefineMethod};
use ndarray::{Array1, Array2, Axis};
use std::error::Error;

/// Encode a few crop-space keypoints as MSRA targets, then decode them back
/// into image space for a person box centred at (320, 240).
fn main() -> Result<(), Box<dyn Error>> {
    let codec = Codec::build(&CodecConfig::MsraHeatmap(MsraHeatmapConfig {
        input_size: [192, 256],
        heatmap_size: [48, 64],
        sigma: 2.0,
        unbiased: true,
        blur_kernel_size: 11,
    }))?;

    let keypoints = Array2::from_shape_vec((3, 2), vec![96.0, 40.0, 70.5, 130.25, 121.0, 201.5])?;
    let visible = Array1::<f32>::ones(3);
    let encoded = codec.encode(keypoints.view(), visible.view())?;

    let (decoded, scores) = codec.decode(encoded.heatmaps.view())?;
    println!("codec round trip (crop pixels):");
    for (k, row) in decoded.outer_iter().enumerate() {
        println!(
            "  kp {k}: ({:.2}, {:.2}) -> ({:.2}, {:.2}) score {:.3}",
            keypoints[[k, 0]],
            keypoints[[k, 1]],
            row[0],
            row[1],
            scores[k]
        );
    }

    let decoder = Decoder::new(DecodeConfig {
        refine: RefineMethod::Dark,
        ..DecodeConfig::default()
    })?;
    let batch = encoded.heatmaps.insert_axis(Axis(0));
    let boxes = [CenterScale::from_box_px([320.0, 240.0], [192.0, 256.0])];
    let out = decoder.decode(batch.view(), &boxes)?;
    println!("decoded in image space:");
    for (k, p) in out.predictions()[0].iter().enumerate() {
        println!("  kp {k}: ({:.2}, {:.2}) score {:.3}", p.x, p.y, p.score);
    }
    Ok(())
}
