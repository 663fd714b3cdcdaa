//! Flat CSV export of stored articles.

use crate::db::Article;

pub const CSV_HEADER: [&str; 7] = ["id", "title", "url", "source", "published", "fetched_at", "summary"];

/// Render `articles` as CSV with a header row.
///
/// `published` is empty for undated articles; summaries are flattened onto a
/// single line.
pub fn articles_to_csv(articles: &[Article]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().copied());

    for article in articles {
        let id = article.id.to_string();
        let summary = article.summary.replace(['\r', '\n'], " ");
        push_record(
            &mut out,
            [
                id.as_str(),
                article.title.as_str(),
                article.url.as_str(),
                article.source.as_str(),
                article.published.as_deref().unwrap_or(""),
                article.fetched_at.as_str(),
                summary.trim(),
            ],
        );
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, title: &str, summary: &str, published: Option<&str>) -> Article {
        Article {
            id,
            source: "BBC World".to_string(),
            title: title.to_string(),
            url: format!("https://x.test/{}", id),
            summary: summary.to_string(),
            published: published.map(str::to_string),
            fetched_at: "2024-12-09T12:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_header_only_when_empty() {
        assert_eq!(
            articles_to_csv(&[]),
            "id,title,url,source,published,fetched_at,summary\r\n"
        );
    }

    #[test]
    fn test_row_fields_in_order() {
        let csv = articles_to_csv(&[article(1, "Iran talks", "Short.", Some("2024-12-09T10:00:00Z"))]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "1,Iran talks,https://x.test/1,BBC World,2024-12-09T10:00:00Z,2024-12-09T12:00:00.000000Z,Short."
        );
    }

    #[test]
    fn test_undated_article_has_empty_published() {
        let csv = articles_to_csv(&[article(2, "Undated", "", None)]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("BBC World,,2024-12-09"));
    }

    #[test]
    fn test_summary_newlines_flattened() {
        let csv = articles_to_csv(&[article(3, "T", "Para one.\n\nPara two.\n", None)]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with("Para one.  Para two."));
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_quotes_fields_with_commas_and_quotes() {
        let csv = articles_to_csv(&[article(4, r#"Korea, "again""#, "", None)]);
        assert!(csv.contains(r#"4,"Korea, ""again""",https://x.test/4"#));
    }
}
