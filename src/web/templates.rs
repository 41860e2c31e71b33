//! HTML page shell shared by the site and the admin

use html_escape::{encode_double_quoted_attribute, encode_text};

/// Wrap `body` in the site layout. `body` must already be escaped.
pub fn page(static_url: &str, title: &str, body: &str) -> String {
    let static_url = encode_double_quoted_attribute(static_url.trim_end_matches('/'));
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="{static_url}/vendors/flowbite.min.css">
<link rel="stylesheet" href="{static_url}/vendors/saas-theme.min.css">
</head>
<body>
<main class="container mx-auto p-6">
{body}
</main>
<script src="{static_url}/vendors/flowbite.min.js"></script>
</body>
</html>"#,
        title = encode_text(title),
    )
}

pub fn escape(text: &str) -> String {
    encode_text(text).into_owned()
}

pub fn escape_attr(text: &str) -> String {
    encode_double_quoted_attribute(text).into_owned()
}
