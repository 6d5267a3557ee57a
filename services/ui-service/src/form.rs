//! Server-rendered HomeLens CA form.

use homelens_core::{FeatureKind, OceanProximity, EXAMPLE_ROWS, FEATURES};
use std::fmt::Write;

use crate::client::FormValues;

pub enum PageResult {
    None,
    Prediction(Option<f64>),
    Failure { message: &'static str, detail: Option<String> },
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn current(values: Option<&FormValues>, name: &str) -> String {
    let Some(v) = values else { return String::new() };
    match name {
        "longitude" => v.longitude.to_string(),
        "latitude" => v.latitude.to_string(),
        "housing_median_age" => v.housing_median_age.to_string(),
        "total_rooms" => v.total_rooms.to_string(),
        "total_bedrooms" => v.total_bedrooms.to_string(),
        "population" => v.population.to_string(),
        "households" => v.households.to_string(),
        "median_income" => v.median_income.to_string(),
        _ => String::new(),
    }
}

pub fn render(values: Option<&FormValues>, result: &PageResult) -> String {
    let mut html = String::from(concat!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>HomeLens CA</title></head><body>",
        "<h1>HomeLens CA</h1>",
        "<p>Predict the median house values in California (1990) given block information. ",
        "Provide the necessary housing and geographical features to receive an accurate prediction.</p>",
        "<form method=\"post\" action=\"/\">",
    ));
    for spec in FEATURES {
        let _ = write!(html, "<fieldset><legend>{}</legend><small>{}</small><br>", escape(spec.label), escape(spec.info));
        match spec.kind {
            FeatureKind::Categorical => {
                for choice in OceanProximity::ALL {
                    let checked = values.is_some_and(|v| v.ocean_proximity == choice.as_str());
                    let _ = write!(
                        html,
                        "<label><input type=\"radio\" name=\"{name}\" value=\"{val}\" required{chk}> {val}</label> ",
                        name = spec.name,
                        val = escape(choice.as_str()),
                        chk = if checked { " checked" } else { "" },
                    );
                }
            }
            FeatureKind::Numeric { min, max, integer } => {
                let _ = write!(
                    html,
                    "<input type=\"number\" name=\"{}\" min=\"{min}\" max=\"{max}\" step=\"{}\" value=\"{}\" required>",
                    spec.name,
                    if integer { "1" } else { "any" },
                    current(values, spec.name),
                );
            }
        }
        html.push_str("</fieldset>");
    }
    html.push_str("<button type=\"submit\">Submit</button></form>");

    html.push_str("<h2>Predicted Median House Value [$]</h2><output id=\"prediction\">");
    match result {
        PageResult::Prediction(Some(v)) => { let _ = write!(html, "{v:.2}"); }
        PageResult::Failure { message, detail } => {
            let _ = write!(html, "Error: {}", escape(message));
            if let Some(detail) = detail {
                let _ = write!(html, " <small>{}</small>", escape(detail));
            }
        }
        PageResult::Prediction(None) | PageResult::None => {}
    }
    html.push_str("</output>");

    html.push_str("<h2>Examples</h2><table><tr>");
    for spec in FEATURES { let _ = write!(html, "<th>{}</th>", escape(spec.label)); }
    html.push_str("<th></th></tr>");
    for (i, row) in EXAMPLE_ROWS.iter().enumerate() {
        let _ = write!(html, "<tr><td>{}</td>", escape(row.ocean_proximity.as_str()));
        for v in row.numeric { let _ = write!(html, "<td>{v}</td>"); }
        let _ = write!(html, "<td><a href=\"/?example={i}\">use</a></td></tr>");
    }
    html.push_str("</table></body></html>");
    html
}
