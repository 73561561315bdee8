use clap::Args;
use eyre::Result;
use timevector::{normalize, Dataset, Key, RawKey, Segments, Threshold};
use tokio::io::AsyncWriteExt;

use crate::io::{read_dataset, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// Plot title
    #[clap(long, default_value = "Time Vector Plot")]
    title: String,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    output: String,

    /// Maximum number of points per series (LTTB downsampling threshold)
    #[clap(long, default_value = "4000")]
    threshold: Threshold,

    /// Only plot points with keys at or after this one
    #[clap(long)]
    from: Option<RawKey>,

    /// Only plot points with keys at or before this one
    #[clap(long)]
    until: Option<RawKey>,

    /// Number of segments downsampled concurrently
    #[clap(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Input files [default: stdin]
    pub files: Vec<String>,
}

pub async fn plot(opts: &Opts) -> Result<()> {
    let dataset = read_dataset(&opts.files, opts.from, opts.until).await?;
    if dataset.is_empty() {
        eyre::bail!("no data to plot");
    }

    let downsampled = dataset.downsample(opts.threshold, opts.workers).await?;

    // Timestamps are plotted as seconds elapsed since each segment's first point.
    let (x_label, series_map) = match &downsampled {
        Dataset::Numeric(segments) => ("Key", to_xy(segments, 1.0)),
        Dataset::Temporal(segments) => ("Seconds elapsed", to_xy(segments, 1e6)),
    };

    // Build per-series JSON arrays: [[x,y], [x,y], ...]
    let mut series_json_parts: Vec<String> = Vec::new();
    for (_, points) in &series_map {
        let pairs: Vec<String> = points
            .iter()
            .map(|(x, y)| format!("[{:.6},{:.4}]", x, y))
            .collect();
        series_json_parts.push(format!("[{}]", pairs.join(",")));
    }
    let series_json = format!("[{}]", series_json_parts.join(","));

    let palette = [
        "#E9D758", "#297373", "#EE7860", "#A1CDF4", "#593C8F", "#DD624E", "#A1674A",
    ];
    let labels: Vec<&String> = series_map.iter().map(|(label, _)| label).collect();
    let colors: Vec<&str> = (0..labels.len())
        .map(|i| palette[i % palette.len()])
        .collect();

    let opts_json = script_json(&serde_json::json!({
        "title": opts.title,
        "xLabel": x_label,
        "labels": labels,
        "colors": colors,
    }))?;

    let html = generate_plot_html(&escape_html(&opts.title), &series_json, &opts_json);

    let mut output = Output::from_filename(&opts.output).await?;
    output.write_all(html.as_bytes()).await?;
    output.flush().await?;

    Ok(())
}

/// Per-segment `(x, y)` pairs, x being the normalized key divided by `per_unit`.
fn to_xy<K: Key>(segments: &Segments<String, K>, per_unit: f64) -> Vec<(String, Vec<(f64, f64)>)> {
    segments
        .iter()
        .map(|(segment, points)| {
            let xy = normalize(points)
                .points
                .into_iter()
                .map(|(x, y)| (x / per_unit, y))
                .collect();
            (segment.clone(), xy)
        })
        .collect()
}

/// Serializes `value` for embedding in a `<script>` element.
fn script_json(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(value)?
        .replace('<', "\\u003c")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029"))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn generate_plot_html(title: &str, series_data: &str, opts: &str) -> String {
    format!(
        r##"<!doctype html>
<html>
<head>
  <title>{title}</title>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>
    * {{ box-sizing: border-box; }}
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 20px; background: #0f1419; color: #e6edf3; }}
    .container {{ max-width: 1600px; margin: 0 auto; }}
    h1 {{ font-size: 24px; font-weight: 600; margin: 0 0 20px 0; }}
    .chart {{ background: #161b22; border: 1px solid #30363d; border-radius: 8px; padding: 20px; }}
    canvas {{ width: 100%; }}
    .legend {{ display: flex; gap: 16px; margin-top: 12px; flex-wrap: wrap; font-size: 13px; }}
    .legend-item {{ display: flex; align-items: center; gap: 6px; }}
    .legend-dot {{ width: 10px; height: 10px; border-radius: 50%; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>{title}</h1>
    <div class="chart">
      <canvas id="chart" height="500"></canvas>
      <div class="legend" id="legend"></div>
    </div>
  </div>
  <script>
    const opts = {opts};
    const seriesData = {series_data};

    function draw() {{
      const canvas = document.getElementById('chart');
      const ctx = canvas.getContext('2d');
      const dpr = window.devicePixelRatio || 1;
      const rect = canvas.getBoundingClientRect();
      canvas.width = rect.width * dpr;
      canvas.height = 500 * dpr;
      ctx.scale(dpr, dpr);
      const W = rect.width;
      const H = 500;
      const pad = {{top: 20, right: 20, bottom: 50, left: 80}};
      const pw = W - pad.left - pad.right;
      const ph = H - pad.top - pad.bottom;

      ctx.clearRect(0, 0, W, H);

      let xMin = Infinity, xMax = -Infinity, yMin = Infinity, yMax = -Infinity;
      for (const series of seriesData) {{
        for (const [x, y] of series) {{
          if (x < xMin) xMin = x;
          if (x > xMax) xMax = x;
          if (y < yMin) yMin = y;
          if (y > yMax) yMax = y;
        }}
      }}
      if (!isFinite(xMin)) return;

      function xToP(x) {{ return pad.left + (x - xMin) / (xMax - xMin || 1) * pw; }}
      function yToP(y) {{ return pad.top + ph - (y - yMin) / (yMax - yMin || 1) * ph; }}

      ctx.strokeStyle = '#30363d';
      ctx.lineWidth = 1;
      for (let i = 0; i <= 5; i++) {{
        const y = pad.top + (ph / 5) * i;
        ctx.beginPath(); ctx.moveTo(pad.left, y); ctx.lineTo(W - pad.right, y); ctx.stroke();
      }}

      ctx.fillStyle = '#8b949e';
      ctx.font = '11px monospace';
      ctx.textAlign = 'right';
      for (let i = 0; i <= 5; i++) {{
        const val = yMin + (1 - i / 5) * (yMax - yMin);
        const y = pad.top + (ph / 5) * i;
        ctx.fillText(val.toFixed(2), pad.left - 8, y + 4);
      }}

      ctx.textAlign = 'center';
      for (let i = 0; i <= 5; i++) {{
        const val = xMin + (i / 5) * (xMax - xMin);
        const x = pad.left + (pw / 5) * i;
        ctx.fillText(val.toFixed(1), x, H - pad.bottom + 20);
      }}

      ctx.font = '12px sans-serif';
      ctx.fillText(opts.xLabel, pad.left + pw / 2, H - 8);
      ctx.save();
      ctx.translate(16, pad.top + ph / 2);
      ctx.rotate(-Math.PI / 2);
      ctx.fillText('Value', 0, 0);
      ctx.restore();

      for (let s = 0; s < seriesData.length; s++) {{
        ctx.strokeStyle = opts.colors[s] || '#8b949e';
        ctx.lineWidth = 1.5;
        ctx.beginPath();
        seriesData[s].forEach(([x, y], i) => {{
          if (i === 0) ctx.moveTo(xToP(x), yToP(y)); else ctx.lineTo(xToP(x), yToP(y));
        }});
        ctx.stroke();
      }}

      const legend = document.getElementById('legend');
      legend.innerHTML = '';
      for (let s = 0; s < opts.labels.length; s++) {{
        const div = document.createElement('div');
        div.className = 'legend-item';
        const dot = document.createElement('span');
        dot.className = 'legend-dot';
        dot.style.background = opts.colors[s];
        div.appendChild(dot);
        div.appendChild(document.createTextNode(opts.labels[s] + ' (' + seriesData[s].length + ' points)'));
        legend.appendChild(div);
      }}
    }}

    draw();
    window.addEventListener('resize', draw);
  </script>
</body>
</html>"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, UNIX_EPOCH};
    use timevector::Point;

    #[test]
    fn temporal_series_plot_as_elapsed_seconds() {
        let origin = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let segments = BTreeMap::from([(
            "d1".to_string(),
            vec![
                Point::new(origin, 1.0),
                Point::new(origin + Duration::from_millis(1500), 2.0),
            ],
        )]);
        assert_eq!(
            to_xy(&segments, 1e6),
            vec![("d1".to_string(), vec![(0.0, 1.0), (1.5, 2.0)])]
        );
    }

    #[test]
    fn script_json_escapes_labels() {
        let json = script_json(&serde_json::json!({
            "labels": ["a\"b\\</script>", "line\nbreak\u{2028}"],
        }))
        .unwrap();
        assert_eq!(
            json,
            r#"{"labels":["a\"b\\\u003c/script>","line\nbreak\u2028"]}"#
        );
        assert!(!json.contains('\n'));
        assert_eq!(escape_html("<b>&"), "&lt;b&gt;&amp;");
    }

    #[test]
    fn html_embeds_data() {
        let html = generate_plot_html("t", "[[[0,1]]]", "{}");
        assert!(html.contains("const seriesData = [[[0,1]]];"));
        assert!(html.contains("<title>t</title>"));
    }
}
