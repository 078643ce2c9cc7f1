//! Descriptive statistics over one extracted numeric column.
//!
//! Undefined results are reported as `NaN` rather than errors: an empty
//! column, a geometric mean over non-positive values, skewness below three
//! values, kurtosis below four.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub sum_of_squares: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub geometric_mean: f64,
    pub quadratic_mean: f64,
    pub median: f64,
    pub population_variance: f64,
    pub sample_variance: f64,
    pub standard_deviation: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl Stats {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::empty();
        }
        let n = count as f64;
        let sum: f64 = values.iter().sum();
        let sum_of_squares: f64 = values.iter().map(|v| v * v).sum();
        let mean = sum / n;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });

        // Central moments around the mean.
        let (m2, m3, m4) = values.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), v| {
            let d = v - mean;
            let d2 = d * d;
            (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
        });

        let population_variance = m2 / n;
        let sample_variance = if count > 1 { m2 / (n - 1.0) } else { 0.0 };
        let standard_deviation = sample_variance.sqrt();

        let geometric_mean = if values.iter().all(|v| *v > 0.0) {
            (values.iter().map(|v| v.ln()).sum::<f64>() / n).exp()
        } else {
            f64::NAN
        };

        let skewness = if count > 2 && sample_variance > 0.0 {
            let s3 = standard_deviation.powi(3);
            (n / ((n - 1.0) * (n - 2.0))) * (m3 / s3)
        } else {
            f64::NAN
        };

        let kurtosis = if count > 3 && sample_variance > 0.0 {
            let s4 = sample_variance * sample_variance;
            let lead = (n * (n + 1.0)) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
            let tail = (3.0 * (n - 1.0).powi(2)) / ((n - 2.0) * (n - 3.0));
            lead * (m4 / s4) - tail
        } else {
            f64::NAN
        };

        Self {
            count,
            sum,
            sum_of_squares,
            min,
            max,
            mean,
            geometric_mean,
            quadratic_mean: (sum_of_squares / n).sqrt(),
            median: median(values),
            population_variance,
            sample_variance,
            standard_deviation,
            skewness,
            kurtosis,
        }
    }

    fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            geometric_mean: f64::NAN,
            quadratic_mean: f64::NAN,
            median: f64::NAN,
            population_variance: f64::NAN,
            sample_variance: f64::NAN,
            standard_deviation: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
        }
    }

    /// `(statistic, value)` pairs in display order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("count", self.count as f64),
            ("sum", self.sum),
            ("sum_of_squares", self.sum_of_squares),
            ("min", self.min),
            ("max", self.max),
            ("mean", self.mean),
            ("geometric_mean", self.geometric_mean),
            ("quadratic_mean", self.quadratic_mean),
            ("median", self.median),
            ("population_variance", self.population_variance),
            ("sample_variance", self.sample_variance),
            ("standard_deviation", self.standard_deviation),
            ("skewness", self.skewness),
            ("kurtosis", self.kurtosis),
        ]
    }

    /// `[statistic, value]` rows for a single-column report.
    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.entries()
            .into_iter()
            .map(|(name, value)| vec![name.to_string(), format_number(value)])
            .collect()
    }

    /// One table row: the column name followed by every statistic.
    pub fn render_row(&self, column: &str) -> Vec<String> {
        std::iter::once(column.to_string())
            .chain(self.entries().into_iter().map(|(_, v)| format_number(v)))
            .collect()
    }

    pub fn table_headers() -> Vec<String> {
        std::iter::once("column".to_string())
            .chain(Self::empty().entries().into_iter().map(|(k, _)| k.to_string()))
            .collect()
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}
