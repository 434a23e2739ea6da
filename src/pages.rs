//! HTML pages. Everything interpolated from user input or remote APIs goes
//! through [`escape`]; only the dataset preview table is pre-rendered.

use std::fmt::Write as _;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>body{{font-family:sans-serif;margin:2rem}}table.dataframe{{border-collapse:collapse}}\
         table.dataframe td,table.dataframe th{{border:1px solid #ccc;padding:4px 8px}}\
         .error{{color:#b00020}}pre{{white-space:pre-wrap}}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

fn error_block(error: Option<&str>) -> String {
    match error {
        Some(e) => format!("<p class=\"error\">{}</p>\n", escape(e)),
        None => String::new(),
    }
}

/// What the index page shows after an upload.
#[derive(Debug, Default)]
pub struct IndexView<'a> {
    pub preview_html: Option<&'a str>,
    pub columns: &'a [String],
    pub error: Option<&'a str>,
}

pub fn index(view: &IndexView<'_>) -> String {
    let mut body = String::from("<h1>Search &amp; Extract</h1>\n");
    body.push_str(&error_block(view.error));
    body.push_str(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <label>CSV file <input type=\"file\" name=\"file\" accept=\".csv\"></label>\n\
         <button type=\"submit\">Upload</button>\n</form>\n\
         <form method=\"post\" action=\"/sheet\">\n\
         <label>Google Sheet ID <input type=\"text\" name=\"spreadsheet_id\"></label>\n\
         <label>Range <input type=\"text\" name=\"range\" placeholder=\"Sheet1\"></label>\n\
         <button type=\"submit\">Load sheet</button>\n</form>\n",
    );
    if let Some(preview) = view.preview_html {
        body.push_str("<h2>Preview</h2>\n");
        body.push_str(preview);
        body.push_str("\n<h2>Query</h2>\n<form method=\"post\" action=\"/query\">\n");
        body.push_str("<label>Entity column <select name=\"entity_column\">\n");
        for c in view.columns {
            let c = escape(c);
            let _ = writeln!(body, "<option value=\"{}\">{}</option>", c, c);
        }
        body.push_str(
            "</select></label>\n\
             <label>Query <input type=\"text\" name=\"query\" placeholder=\"Get me the email address of {company}\"></label>\n\
             <button type=\"submit\">Run</button>\n</form>\n",
        );
    }
    layout("Search & Extract", &body)
}

/// Successful `/query` outcome.
#[derive(Debug)]
pub struct QueryView<'a> {
    pub query: &'a str,
    pub entity_column: &'a str,
    pub extracted_info: &'a str,
}

pub fn query_result(view: &QueryView<'_>) -> String {
    let body = format!(
        "<h1>Query result</h1>\n<p><strong>Query:</strong> {}</p>\n\
         <p><strong>Entity column:</strong> {}</p>\n<h2>Extracted information</h2>\n<pre>{}</pre>\n\
         <form method=\"post\" action=\"/result\"><button type=\"submit\">View results</button></form>\n\
         <p><a href=\"/download\">Download CSV</a> | <a href=\"/\">Start over</a></p>\n",
        escape(view.query),
        escape(view.entity_column),
        escape(view.extracted_info)
    );
    layout("Query result", &body)
}

pub fn result(extracted_info: &str) -> String {
    let body = format!(
        "<h1>Results</h1>\n<pre>{}</pre>\n<p><a href=\"/download\">Download CSV</a> | <a href=\"/\">Start over</a></p>\n",
        escape(extracted_info)
    );
    layout("Results", &body)
}

pub fn error(message: &str) -> String {
    let body = format!(
        "<h1>Something went wrong</h1>\n{}<p><a href=\"/\">Back</a></p>\n",
        error_block(Some(message))
    );
    layout("Error", &body)
}
