use std::path::Path;

use super::ReportData;
use crate::client::JenkinsClient;
use crate::error::{FinderError, FinderResult};
use crate::model::CellDetails;

const STYLE: &str = r#"
        table, th, td { border: 1px solid black; }
        .red { background-color: #ff8080; }
        .orange { background-color: #ffbf80; }
        .yellow { background-color: #ffff80; }
        .almostgreen { background-color: #dfff80; }
        .green { background-color: #9fff80; }
        .unimportant { }
        .tests_passed { color: #226c18; font-weight: bold; }
        .tests_failed { color: #8a1717; font-weight: bold; }
        .tests_skipped { color: #535453; font-weight: bold; }
        .center { text-align: center; }
        .nowrap { white-space: nowrap; }
        details > div { text-align: left; }
"#;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn write_html(data: &ReportData<'_>, out: &Path) -> FinderResult<()> {
    std::fs::write(out, render_html(data)).map_err(|e| FinderError::io(out, e))
}

pub fn render_html(data: &ReportData<'_>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("    <title>flakefinder report</title>\n    <meta charset=\"UTF-8\">\n");
    html.push_str(&format!("    <style>{STYLE}    </style>\n"));
    html.push_str("</head>\n<body>\n<h1>flakefinder report</h1>\n\n<div>\n");
    html.push_str(&format!(
        "    Data range from {} till {}<br/>\n",
        data.window.start.format(TIME_FORMAT),
        data.window.end.format(TIME_FORMAT)
    ));
    if !data.pull_requests.is_empty() {
        let prs: Vec<String> = data.pull_requests.iter().map(|n| format!("#{n}")).collect();
        html.push_str(&format!("    Pull requests: {}<br/>\n", prs.join(", ")));
    }
    html.push_str("</div>\n\n");

    let tests = data.tests();
    if tests.is_empty() {
        html.push_str("<div>No failing tests!</div>\n");
    } else {
        render_table(&mut html, data, &tests);
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_table(html: &mut String, data: &ReportData<'_>, tests: &[String]) {
    let headers = data.headers();

    html.push_str("<table>\n    <tr>\n        <td></td>\n        <td></td>\n");
    for lane in &headers {
        match &data.ci_url {
            Some(base) => html.push_str(&format!(
                "        <td><a href=\"{}\">{}</a></td>\n",
                escape(&lane_url(base, lane)),
                escape(lane)
            )),
            None => html.push_str(&format!("        <td>{}</td>\n", escape(lane))),
        }
    }
    html.push_str("    </tr>\n");

    for (row, test) in tests.iter().enumerate() {
        html.push_str("    <tr>\n");
        html.push_str(&format!(
            "        <td><div id=\"row{row}\"><a href=\"#row{row}\">{row}</a></div></td>\n"
        ));
        html.push_str(&format!("        <td>{}</td>\n", escape(test)));
        for lane in &headers {
            match data.matrix.get(test, lane) {
                Some(cell) => render_cell(html, data, lane, cell),
                None => html.push_str("        <td class=\"center\">N/A</td>\n"),
            }
        }
        html.push_str("    </tr>\n");
    }
    html.push_str("</table>\n");
}

fn render_cell(html: &mut String, data: &ReportData<'_>, lane: &str, cell: &CellDetails) {
    html.push_str(&format!(
        "        <td class=\"{} center\">\n",
        cell.severity().css_class()
    ));
    html.push_str(&format!(
        "            <details><summary><span class=\"tests_failed\" title=\"failed tests\">{}</span>/<span class=\"tests_passed\" title=\"passed tests\">{}</span>/<span class=\"tests_skipped\" title=\"skipped tests\">{}</span></summary>\n",
        cell.failed(),
        cell.succeeded(),
        cell.skipped()
    ));
    for occurrence in cell.occurrences() {
        let label = if occurrence.pr_number != 0 {
            format!("{} (PR #{})", occurrence.build_number, occurrence.pr_number)
        } else {
            occurrence.build_number.to_string()
        };
        html.push_str(&format!(
            "                <div class=\"{} nowrap\">",
            occurrence.severity.css_class()
        ));
        match &data.ci_url {
            Some(base) => {
                let url = JenkinsClient::build_url(base, lane, occurrence.build_number);
                html.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    escape(&url),
                    escape(&label)
                ));
            }
            None => html.push_str(&escape(&label)),
        }
        html.push_str("</div>\n");
    }
    html.push_str("            </details>\n        </td>\n");
}

fn lane_url(base: &str, lane: &str) -> String {
    format!(
        "{}/job/{}/",
        base.trim_end_matches('/'),
        urlencoding::encode(lane)
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::model::{BuildObservation, ReportMatrix, ReportWindow, TestCase, TestOutcome};
    use chrono::{TimeZone, Utc};

    fn window() -> ReportWindow {
        ReportWindow::ending_at(
            Utc.with_ymd_and_hms(2019, 8, 23, 0, 0, 0).unwrap(),
            chrono::Duration::hours(24),
        )
        .unwrap()
    }

    fn observation(lane: &str, build: u64, cases: &[(&str, TestOutcome)]) -> BuildObservation {
        BuildObservation {
            lane: lane.into(),
            build_number: build,
            pr_number: 0,
            cases: cases.iter().map(|(n, o)| TestCase::new(*n, *o)).collect(),
            timestamp: window().end,
        }
    }

    #[test]
    fn test_no_failing_tests() {
        let matrix = aggregate(vec![observation("lane-a", 1, &[("ok", TestOutcome::Passed)])]);
        let html = render_html(&ReportData::new(&matrix, window()));
        assert!(html.contains("No failing tests!"));
        assert!(!html.contains("<table>"));
        assert!(html.contains("Data range from 2019-08-22 00:00:00 UTC till 2019-08-23 00:00:00 UTC"));
    }

    #[test]
    fn test_rows_are_ranked_failing_tests() {
        let matrix = aggregate(vec![
            observation(
                "lane-a",
                1,
                &[
                    ("mild <flake>", TestOutcome::Failed),
                    ("broken", TestOutcome::Failed),
                    ("ok", TestOutcome::Passed),
                ],
            ),
            observation("lane-b", 2, &[("mild <flake>", TestOutcome::Passed)]),
        ]);
        let data = ReportData::new(&matrix, window()).with_ci_url("https://ci.example/");
        assert_eq!(data.tests(), vec!["mild <flake>", "broken"]);

        let html = render_html(&data);
        assert!(html.contains("mild &lt;flake&gt;"));
        assert!(!html.contains("<td>ok</td>"));
        assert!(html.contains("<a href=\"https://ci.example/job/lane-a/1/\">1</a>"));
        assert!(html.contains("class=\"red center\""));
        assert!(html.contains("N/A"));
    }

    #[test]
    fn test_pr_numbers_are_listed() {
        let mut obs = observation("lane-a", 5, &[("t", TestOutcome::Failed)]);
        obs.pr_number = 4217;
        let matrix = aggregate(vec![obs]);
        let html = render_html(&ReportData::new(&matrix, window()).with_pull_requests(vec![4217]));
        assert!(html.contains("Pull requests: #4217"));
        assert!(html.contains("5 (PR #4217)"));
    }

    #[test]
    fn test_headers_and_row_anchors() {
        let matrix = aggregate(vec![observation(
            "lane a",
            3,
            &[("t", TestOutcome::Failed)],
        )]);
        let linked = render_html(&ReportData::new(&matrix, window()).with_ci_url("https://ci.example"));
        assert!(linked.contains("<td><a href=\"https://ci.example/job/lane%20a/\">lane a</a></td>\n"));
        assert!(linked.contains("<div id=\"row0\"><a href=\"#row0\">0</a></div>"));
        assert!(linked.contains("<span class=\"tests_failed\" title=\"failed tests\">1</span>"));

        let plain = render_html(&ReportData::new(&matrix, window()));
        assert!(plain.contains("        <td>lane a</td>\n"));
        assert!(plain.contains("<div class=\"red nowrap\">3</div>\n"));
    }

    #[test]
    fn test_empty_matrix() {
        let matrix = ReportMatrix::new();
        let html = render_html(&ReportData::new(&matrix, window()));
        assert!(html.contains("No failing tests!"));
    }
}
