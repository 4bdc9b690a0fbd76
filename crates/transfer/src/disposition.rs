// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything outside RFC 5987 `attr-char`.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

fn is_legacy_msie(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    ua.contains("msie") || ua.contains("trident")
}

fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `Content-Disposition` value for an attachment named `name`.
///
/// Every client gets the RFC 6266 `filename*` parameter. Old Internet
/// Explorer ignores it and decodes a percent-encoded plain `filename`
/// instead, so it gets that form.
#[must_use]
pub fn content_disposition(name: &str, user_agent: Option<&str>) -> String {
    let encoded = utf8_percent_encode(name, ATTR_CHAR).to_string();
    let plain = if user_agent.is_some_and(is_legacy_msie) {
        encoded.clone()
    } else {
        ascii_fallback(name)
    };
    format!("attachment; filename=\"{plain}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_name() {
        assert_eq!(
            content_disposition("report.pdf", Some("curl/8.5")),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_unicode_name() {
        assert_eq!(
            content_disposition("报告 1.pdf", None),
            "attachment; filename=\"__ 1.pdf\"; filename*=UTF-8''%E6%8A%A5%E5%91%8A%201.pdf"
        );
    }

    #[test]
    fn test_quotes_are_not_injected() {
        let value = content_disposition("a\"b.txt", None);
        assert!(value.starts_with("attachment; filename=\"a_b.txt\";"));
        assert!(value.ends_with("a%22b.txt"));
    }

    #[test]
    fn test_legacy_msie_gets_encoded_filename() {
        let ua = "Mozilla/5.0 (Windows NT 6.1; WOW64; Trident/7.0; rv:11.0) like Gecko";
        assert_eq!(
            content_disposition("报告.pdf", Some(ua)),
            "attachment; filename=\"%E6%8A%A5%E5%91%8A.pdf\"; \
             filename*=UTF-8''%E6%8A%A5%E5%91%8A.pdf"
        );
    }
}
