use crate::metrics::Histogram;
use crate::table::{HR_PERCENT_COLUMN, Table};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

const SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";
const DATE_AXIS_FORMAT: &str = "%Y %B";

const POWER_COLOR: &str = "#c8a85a";
const CONDITIONING_COLOR: &str = "#C34B3E";

/// Velocity bands stacked in the distance-by-speed-zone chart.
pub const VELOCITY_BANDS: [&str; 4] = [
    "Velocity Band 3 Total Distance",
    "Velocity Band 4 Total Distance",
    "Velocity Band 5 Total Distance",
    "Velocity Band 6 Total Distance",
];

/// A titled Vega-Lite specification, rendered by vega-embed in the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub spec: JsonValue,
}

/// Raw rows shown on the last tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One dashboard tab
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    pub name: String,
    pub charts: Vec<Chart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawView>,
}

impl Tab {
    fn charts(name: &str, charts: Vec<Chart>) -> Self {
        Tab {
            name: name.to_string(),
            charts,
            raw: None,
        }
    }
}

/// Build every tab of the team dashboard from the filtered rows
///
/// Aggregation (means, min/max, confidence bands) is declared in the specs
/// and computed by the renderer, so the rows are embedded as-is.
pub fn dashboard_tabs(filtered: &Table) -> Vec<Tab> {
    let data = json!({ "values": filtered.to_records() });
    vec![
        Tab::charts("Speed", speed_charts(&data)),
        Tab::charts("Power", power_charts(&data)),
        Tab::charts("Conditioning", conditioning_charts(&data)),
        Tab {
            name: "Raw".to_string(),
            charts: Vec::new(),
            raw: Some(raw_view(filtered)),
        },
    ]
}

pub fn raw_view(table: &Table) -> RawView {
    RawView {
        headers: table.headers.clone(),
        rows: table.display_rows(),
    }
}

fn chart(title: &str, data: &JsonValue, body: JsonValue) -> Chart {
    let mut spec = json!({
        "$schema": SCHEMA,
        "width": "container",
        "data": data,
    });
    if let (Some(spec_map), JsonValue::Object(body_map)) = (spec.as_object_mut(), body) {
        spec_map.extend(body_map);
    }
    Chart {
        title: title.to_string(),
        spec,
    }
}

fn date_x() -> JsonValue {
    json!({
        "field": "Date",
        "type": "temporal",
        "axis": { "format": DATE_AXIS_FORMAT },
    })
}

fn bar_mark(color: Option<&str>) -> JsonValue {
    let mut mark = json!({ "type": "bar", "cornerRadius": 8, "width": 20 });
    if let Some(color) = color {
        mark["color"] = json!(color);
    }
    mark
}

/// Mean line with a confidence band around it.
fn line_with_band(
    field: &str,
    title: Option<&str>,
    domain: Option<[f64; 2]>,
    color: Option<&str>,
) -> JsonValue {
    let mut y = json!({ "field": field, "type": "quantitative", "aggregate": "mean" });
    let mut band_y = json!({ "field": field, "type": "quantitative" });
    if let Some(title) = title {
        y["title"] = json!(title);
    }
    if let Some(domain) = domain {
        y["scale"] = json!({ "domain": domain });
        band_y["scale"] = json!({ "domain": domain });
    }

    let mut line = json!({ "type": "line" });
    let mut band = json!({ "type": "errorband", "extent": "ci" });
    if let Some(color) = color {
        line["color"] = json!(color);
        band["color"] = json!(color);
    }

    json!({
        "layer": [
            { "mark": line, "encoding": { "x": date_x(), "y": y } },
            {
                "mark": band,
                "encoding": {
                    "x": { "field": "Date", "type": "temporal" },
                    "y": band_y,
                },
            },
        ]
    })
}

fn speed_charts(data: &JsonValue) -> Vec<Chart> {
    let speed = line_with_band("Maximum Velocity", None, Some([12.0, 35.0]), None);

    let zones = json!({
        "transform": [
            { "fold": VELOCITY_BANDS, "as": ["Speed Zone", "Distance"] }
        ],
        "mark": bar_mark(None),
        "encoding": {
            "x": date_x(),
            "y": {
                "field": "Distance",
                "type": "quantitative",
                "aggregate": "mean",
                "scale": { "domain": [0, 1000] },
            },
            "order": { "field": "key", "type": "nominal", "sort": "descending" },
            "color": {
                "field": "Speed Zone",
                "type": "nominal",
                "scale": { "scheme": "lighttealblue" },
                "legend": {
                    "orient": "bottom",
                    "direction": "horizontal",
                    "titleAnchor": "middle",
                },
            },
        },
    });

    vec![
        chart("Speed", data, speed),
        chart("Distance by speed zone", data, zones),
    ]
}

fn power_charts(data: &JsonValue) -> Vec<Chart> {
    let peak_power = json!({
        "mark": bar_mark(Some(POWER_COLOR)),
        "encoding": {
            "x": date_x(),
            "y": {
                "field": "Peak Meta Power",
                "type": "quantitative",
                "aggregate": "mean",
                "title": "Maximum Power",
            },
        },
    });

    // min..max range per day with the two extremes printed on the bar ends
    let efforts_label = |aggregate: &str, dy: i32| {
        json!({
            "mark": { "type": "text", "align": "center", "dy": dy },
            "encoding": {
                "x": { "field": "Date", "type": "temporal" },
                "y": { "field": "Explosive Efforts", "type": "quantitative", "aggregate": aggregate },
                "text": { "field": "Explosive Efforts", "type": "quantitative", "aggregate": aggregate },
            },
        })
    };
    let efforts = json!({
        "layer": [
            {
                "mark": bar_mark(Some(POWER_COLOR)),
                "encoding": {
                    "x": { "field": "Date", "type": "temporal" },
                    "y": { "field": "Explosive Efforts", "type": "quantitative", "aggregate": "min" },
                    "y2": { "field": "Explosive Efforts", "aggregate": "max" },
                },
            },
            efforts_label("min", -10),
            efforts_label("max", 10),
        ]
    });

    vec![
        chart("Maximum Power", data, peak_power),
        chart("Explosive Efforts", data, efforts),
    ]
}

fn conditioning_charts(data: &JsonValue) -> Vec<Chart> {
    let heart_rate = json!({
        "layer": [
            {
                "mark": { "type": "line", "color": CONDITIONING_COLOR },
                "encoding": {
                    "x": date_x(),
                    "y": {
                        "field": "Mean Heart Rate",
                        "type": "quantitative",
                        "aggregate": "mean",
                        "title": "Mean HR",
                    },
                },
            },
            {
                "mark": bar_mark(Some(CONDITIONING_COLOR)),
                "encoding": {
                    "x": date_x(),
                    "y": {
                        "field": "Maximum Heart Rate",
                        "type": "quantitative",
                        "aggregate": "mean",
                        "title": "Max HR",
                    },
                },
            },
        ]
    });

    let above_85 = line_with_band(
        HR_PERCENT_COLUMN,
        Some("% time above 85%HRMax"),
        None,
        Some(CONDITIONING_COLOR),
    );

    vec![
        chart("Heart rate", data, heart_rate),
        chart("Time above 85% HRmax", data, above_85),
    ]
}

/// Bar chart of histogram counts, one bar per bin
pub fn histogram_chart(title: &str, hist: &Histogram) -> Chart {
    let values: Vec<JsonValue> = hist
        .counts
        .iter()
        .enumerate()
        .map(|(bin, count)| {
            json!({
                "bin": bin,
                "start": hist.edges[bin],
                "end": hist.edges[bin + 1],
                "count": count,
            })
        })
        .collect();

    chart(
        title,
        &json!({ "values": values }),
        json!({
            "mark": "bar",
            "encoding": {
                "x": { "field": "bin", "type": "ordinal" },
                "y": { "field": "count", "type": "quantitative" },
                "tooltip": [
                    { "field": "start", "type": "quantitative" },
                    { "field": "end", "type": "quantitative" },
                    { "field": "count", "type": "quantitative" },
                ],
            },
        }),
    )
}
