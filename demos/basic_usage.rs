//! Basic usage example for the mixed_doe library.
//!
//! This example simulates a replicated 3^3 factorial with two correlated
//! responses, runs the full pipeline, and prints the console summary.

use mixed_doe::prelude::*;
use ndarray::Array2;

fn main() {
    println!("Mixed DOE - Basic Usage Example\n");

    let predictors: Vec<String> = ["dye1", "Time", "Temp"].map(String::from).to_vec();
    let responses: Vec<String> = ["Lvalue", "Avalue"].map(String::from).to_vec();

    // Deterministic pseudo-noise so the output is reproducible
    let noise = |i: usize| ((i * 7919 % 101) as f64 / 101.0 - 0.5) * 0.4;

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut i = 0;
    for dye in [0.5, 1.0, 1.5] {
        for time in [10.0, 20.0, 30.0] {
            for temp in [60.0, 70.0, 80.0] {
                let batch = noise(i + 1000);
                for _ in 0..3 {
                    x.extend([dye, time, temp]);
                    let l = 80.0 - 12.0 * dye - 0.2 * time + 4.0 * dye * dye + batch + noise(i);
                    let a = 5.0 + 3.0 * dye + 0.05 * temp - 0.01 * time * dye + 0.5 * batch + noise(i + 500);
                    y.extend([l, a]);
                    i += 1;
                }
            }
        }
    }
    let n = i;

    let dataset = Dataset::from_arrays(
        predictors.clone(),
        Array2::from_shape_vec((n, 3), x).expect("shape matches"),
        responses.clone(),
        Array2::from_shape_vec((n, 2), y).expect("shape matches"),
    )
    .expect("valid dataset");

    println!(
        "{} runs in {} configurations\n",
        dataset.n_observations(),
        dataset.grouping().n_groups()
    );

    let config = AnalysisConfig::with_columns(predictors, responses);
    let analysis = analyze(&dataset, &config).expect("analysis failed");

    println!("Full-model LogWorth (top 5):");
    for row in analysis.full_effects.rows.iter().take(5) {
        println!(
            "  {:<20} max {:>7.3}  median {:>7.3}  significant in {}",
            row.effect.to_string(),
            row.max_logworth,
            row.median_logworth,
            row.appears_significant
        );
    }
    println!();

    print!("{}", render_summary(&analysis));

    // Natural-unit prediction at a new setting
    if let Some(result) = analysis.response("Lvalue") {
        let setting = |name: &str| match name {
            "dye1" => Some(1.2),
            "Time" => Some(15.0),
            "Temp" => Some(65.0),
            _ => None,
        };
        let predicted = result.natural.predict(setting).expect("all predictors supplied");
        println!("\nPredicted Lvalue at dye1=1.2, Time=15, Temp=65: {predicted:.3}");
    }
}
