/// Basic usage example: feed raw IMU samples, get a pen trajectory
use motion_trace::{
    CalibrationConfig, EstimatorConfig, MotionEstimator, PenState, SensorSample, StrokeCollector,
};

fn main() {
    println!("=== Motion Trace: Basic Example ===\n");

    // Default deployment: raw units, direction-locked bursts at 50 units/s
    let config = EstimatorConfig::default();
    let mut estimator = MotionEstimator::new(config);
    let bias = CalibrationConfig::PRIMARY_BIAS;
    let raw = |dx: f64, dy: f64| [bias[0] + dx, bias[1] + dy, bias[2]];

    // Simulated stream at 10Hz: rest, a push along +y, rest, a push along -x, rest
    let mut motion_samples = Vec::new();
    for t in (0..=500).step_by(100) {
        motion_samples.push((t, raw(20.0, -30.0)));
    }
    motion_samples.push((600, raw(0.0, 1200.0)));
    motion_samples.push((700, raw(40.0, 900.0)));
    for t in (800..=1200).step_by(100) {
        motion_samples.push((t, raw(-15.0, 10.0)));
    }
    motion_samples.push((1300, raw(-450.0, 20.0)));
    for t in (1400..=1800).step_by(100) {
        motion_samples.push((t, raw(5.0, 0.0)));
    }

    println!("Processing {} samples...\n", motion_samples.len());

    let mut strokes = StrokeCollector::new();

    for (timestamp, accel) in motion_samples {
        let sample = SensorSample::new(timestamp, accel);

        match estimator.add_sample(&sample) {
            Ok(Some(update)) => {
                let (x, y, pen) = update.plot_coordinates();
                let marker = if pen == PenState::PenDown { "draw" } else { "    " };
                println!("{timestamp:>5}ms  {marker}  ({x:>7.2}, {y:>7.2})");
                strokes.push(&update);
            }
            Ok(None) => println!("{timestamp:>5}ms  (clock seeded)"),
            Err(err) => println!("{timestamp:>5}ms  rejected: {err}"),
        }
    }

    let strokes = strokes.finish();
    let (threshold_x, threshold_y) = estimator.thresholds();

    println!("\n=== Summary ===");
    println!("Strokes drawn: {}", strokes.len());
    for (i, stroke) in strokes.iter().enumerate() {
        println!(
            "  [{i}] {}-{}ms, {} points, length {:.1}",
            stroke.start_ms,
            stroke.end_ms,
            stroke.points.len(),
            stroke.length()
        );
    }
    println!("Adapted thresholds: x={threshold_x:.1}, y={threshold_y:.1}");
    println!("Final position: {:?}", estimator.get_plot_coordinates());
}
