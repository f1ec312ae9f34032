// demos/find_circles.rs — detect circles in an image file.
//
// Usage:
//   cargo run --example find_circles -- input.png [--cpu] [--show]
//
// Writes the annotated result to hough_circles.png. `--show` opens a
// minifb window with the result; `--cpu` skips adapter selection and
// runs the software reference backend.

use circlet::edge::{detect_edges, grayscale, load_image};
use circlet::gpu::device::GpuDevice;
use circlet::{detect_circles_cpu, detect_circles_gpu, DeviceConfig, HoughConfig};

const OUTPUT_PATH: &str = "hough_circles.png";

/// Ceiling handed to the CPU backend, which has no driver-reported
/// allocation limit: 256 MiB keeps the batch split realistic.
const CPU_CEILING: u64 = 256 << 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "input.png".to_string());
    let force_cpu = args.iter().any(|a| a == "--cpu");

    let mut config = HoughConfig {
        min_radius: 20,
        max_radius: 120,
        radius_step: 1,
        sensitivity: 0.6,
        radius_tolerance: 1,
        profile: true,
        ..HoughConfig::default()
    };
    config.visualize = args.iter().any(|a| a == "--show");

    let input = load_image(&path)?;
    let gray = grayscale(&input);
    let edge = detect_edges(&gray, config.canny_low, config.canny_high);
    eprintln!(
        "[circlet] {path}: {}×{}, {} edge pixels",
        input.width(),
        input.height(),
        edge.pixels().filter(|&(_, _, v)| v != 0).count(),
    );

    let mut canvas = input.clone();
    let report = if force_cpu {
        detect_circles_cpu(&config, &edge, &mut canvas, CPU_CEILING)?
    } else {
        match GpuDevice::select(&DeviceConfig::default()) {
            Ok(gpu) => {
                eprintln!("[circlet] {gpu}");
                detect_circles_gpu(&gpu, &config, &edge, &mut canvas)?
            }
            Err(e) => {
                eprintln!("[circlet] no GPU backend ({e}); falling back to CPU reference");
                detect_circles_cpu(&config, &edge, &mut canvas, CPU_CEILING)?
            }
        }
    };

    for d in &report.detections {
        println!("circle at x={}, y={}, radius={}", d.x, d.y, d.radius);
    }
    eprintln!(
        "[circlet] {} detections, {} batches, {:.2?} total",
        report.detections.len(),
        report.timings.len(),
        report.total,
    );

    canvas.save(OUTPUT_PATH)?;
    eprintln!("[circlet] wrote {OUTPUT_PATH}");

    if config.visualize {
        show_window(&canvas)?;
    }
    Ok(())
}

/// Blocking minifb window showing the annotated image until Escape.
fn show_window(canvas: &image::RgbImage) -> Result<(), Box<dyn std::error::Error>> {
    use minifb::{Key, Window, WindowOptions};

    let (w, h) = (canvas.width() as usize, canvas.height() as usize);
    let buffer: Vec<u32> = canvas
        .pixels()
        .map(|px| {
            let [r, g, b] = px.0;
            (r as u32) << 16 | (g as u32) << 8 | b as u32
        })
        .collect();

    let mut window = Window::new("circlet — detected circles", w, h, WindowOptions::default())?;
    while window.is_open() && !window.is_key_down(Key::Escape) {
        window.update_with_buffer(&buffer, w, h)?;
    }
    Ok(())
}
