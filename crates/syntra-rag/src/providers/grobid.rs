//! GROBID client and TEI XML parsing
//!
//! GROBID answers with TEI documents. They are read into a small element
//! tree with quick-xml and queried the way the header and fulltext
//! extractors need.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

use crate::config::GrobidConfig;
use crate::error::{Error, GrobidError, Result};

/// Bibliographic header of a PDF
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    /// Raw date string as GROBID reports it
    pub publication_date: Option<String>,
    pub publisher: Option<String>,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
}

/// A body division with its heading
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

impl Section {
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }
}

/// Body text, bibliography and structure of a PDF
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FulltextResult {
    /// Body paragraphs separated by blank lines
    pub text: String,
    /// Titles of cited works
    pub references: Vec<String>,
    pub sections: Vec<Section>,
}

/// HTTP client for a GROBID server
pub struct GrobidClient {
    client: Client,
    base_url: String,
    header_timeout: Duration,
    fulltext_timeout: Duration,
}

impl GrobidClient {
    pub fn new(config: &GrobidConfig) -> Result<Self> {
        let client = Client::builder().pool_max_idle_per_host(2).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            header_timeout: Duration::from_secs(config.header_timeout_secs),
            fulltext_timeout: Duration::from_secs(config.fulltext_timeout_secs),
        })
    }

    /// Check if GROBID is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/isalive", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn post_pdf(
        &self,
        endpoint: &str,
        pdf: &[u8],
        timeout: Duration,
        consolidate_header: bool,
    ) -> Result<reqwest::Response> {
        let part = Part::bytes(pdf.to_vec())
            .file_name("document.pdf")
            .mime_str("application/pdf")?;
        let mut form = Form::new().part("input", part);
        if consolidate_header {
            form = form.text("consolidateHeader", "1");
        }

        let url = format!("{}/api/{}", self.base_url, endpoint);
        self.client
            .post(&url)
            .header(header::ACCEPT, "application/xml")
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::from(GrobidError::Timeout)
                } else {
                    tracing::warn!("GROBID {} request failed: {}", endpoint, e);
                    Error::from(GrobidError::Unavailable)
                }
            })
    }

    /// Extract title, authors and other header fields
    pub async fn process_header(&self, pdf: &[u8]) -> Result<HeaderMetadata> {
        let endpoint = "processHeaderDocument";
        let response = self
            .post_pdf(endpoint, pdf, self.header_timeout, true)
            .await?;

        if response.status() != StatusCode::OK {
            return Err(GrobidError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let xml = response.text().await?;
        let header = parse_header_tei(&xml)?;
        tracing::debug!("GROBID header title: {:?}", header.title);
        Ok(header)
    }

    /// Extract body text, references and sections
    ///
    /// A non-200 answer or unparseable TEI yields an empty result.
    pub async fn process_fulltext(&self, pdf: &[u8]) -> Result<FulltextResult> {
        let response = self
            .post_pdf("processFulltextDocument", pdf, self.fulltext_timeout, false)
            .await?;

        if response.status() != StatusCode::OK {
            tracing::warn!("GROBID fulltext returned HTTP {}", response.status());
            return Ok(FulltextResult::default());
        }

        let xml = response.text().await?;
        match parse_fulltext_tei(&xml) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!("Ignoring GROBID fulltext: {}", e);
                Ok(FulltextResult::default())
            }
        }
    }
}

/// Read the header fields from a `processHeaderDocument` TEI response
pub fn parse_header_tei(xml: &str) -> std::result::Result<HeaderMetadata, GrobidError> {
    let root = parse_tree(xml)?;

    let authors = root
        .descendants("author")
        .into_iter()
        .filter_map(|author| author.child("persName"))
        .filter_map(|pers| {
            let forenames: Vec<String> = pers
                .children_named("forename")
                .map(|f| f.text())
                .collect();
            let surname = pers.child("surname").map(|s| s.text()).unwrap_or_default();
            let name = format!("{} {}", forenames.join(" "), surname);
            non_empty(name.trim())
        })
        .collect();

    let doi = root
        .descendants("idno")
        .into_iter()
        .find(|idno| idno.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("DOI")))
        .and_then(|idno| non_empty(&idno.text()));

    let dates = root.descendants("date");
    let publication_date = dates
        .iter()
        .find(|d| d.attr("type") == Some("published"))
        .and_then(|d| d.attr("when"))
        .and_then(non_empty)
        .or_else(|| dates.iter().find_map(|d| non_empty(&d.text())));

    let publisher = root
        .descendants("publicationStmt")
        .into_iter()
        .flat_map(|stmt| stmt.children_named("publisher"))
        .find_map(|p| non_empty(&p.text()));

    let journal = root
        .descendants("sourceDesc")
        .into_iter()
        .flat_map(|desc| desc.descendants("title"))
        .filter(|t| t.attr("level") == Some("j"))
        .find_map(|t| non_empty(&t.text()));

    let abstract_text = root
        .descendants("profileDesc")
        .into_iter()
        .flat_map(|desc| desc.children_named("abstract"))
        .find_map(|a| non_empty(&a.text()));

    let keywords = root
        .descendants("keywords")
        .into_iter()
        .flat_map(|k| k.descendants("term"))
        .filter_map(|term| non_empty(&term.text()))
        .collect();

    Ok(HeaderMetadata {
        title: find_title(&root),
        authors,
        doi,
        publication_date,
        publisher,
        journal,
        abstract_text,
        keywords,
    })
}

/// Title lookup in decreasing order of reliability
fn find_title(root: &Element) -> Option<String> {
    let title_stmt_titles: Vec<&Element> = root
        .descendants("titleStmt")
        .into_iter()
        .flat_map(|stmt| stmt.children_named("title"))
        .collect();

    let source_article_titles: Vec<&Element> = root
        .descendants("sourceDesc")
        .into_iter()
        .flat_map(|desc| desc.descendants("title"))
        .filter(|t| t.attr("level") == Some("a"))
        .collect();

    let analytic_titles: Vec<&Element> = root
        .descendants("analytic")
        .into_iter()
        .flat_map(|a| a.children_named("title"))
        .collect();

    let candidates: [Vec<&Element>; 6] = [
        title_stmt_titles
            .iter()
            .copied()
            .filter(|t| t.attr("type") == Some("main"))
            .collect(),
        title_stmt_titles
            .iter()
            .copied()
            .filter(|t| t.attr("type").is_none())
            .collect(),
        title_stmt_titles.clone(),
        source_article_titles,
        analytic_titles,
        root.descendants("head"),
    ];

    for group in candidates.iter() {
        if let Some(title) = group
            .iter()
            .map(|t| t.text())
            .find(|t| t.chars().count() > 3)
        {
            return Some(title);
        }
    }

    // Last resort: the first body heading of any length
    root.descendants("body")
        .into_iter()
        .flat_map(|body| body.descendants("head"))
        .find_map(|head| non_empty(&head.text()))
}

/// Read paragraphs, references and sections from a `processFulltextDocument` response
pub fn parse_fulltext_tei(xml: &str) -> std::result::Result<FulltextResult, GrobidError> {
    let root = parse_tree(xml)?;
    let bodies = root.descendants("body");

    let paragraphs: Vec<String> = bodies
        .iter()
        .flat_map(|body| body.descendants("p"))
        .filter_map(|p| non_empty(&p.text()))
        .collect();

    let references = root
        .descendants("listBibl")
        .into_iter()
        .flat_map(|list| list.descendants("title"))
        .filter_map(|t| non_empty(&t.text()))
        .collect();

    let sections = bodies
        .iter()
        .flat_map(|body| body.descendants("div"))
        .filter_map(|div| {
            let paragraphs: Vec<String> = div
                .children_named("p")
                .filter_map(|p| non_empty(&p.text()))
                .collect();
            if paragraphs.is_empty() {
                return None;
            }
            Some(Section {
                title: div.child("head").and_then(|h| non_empty(&h.text())),
                paragraphs,
            })
        })
        .collect();

    Ok(FulltextResult {
        text: paragraphs.join("\n\n"),
        references,
        sections,
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, GrobidError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| GrobidError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| GrobidError::Xml(e.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Matching descendants in document order
    fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect();
        stack.reverse();
        while let Some(element) = stack.pop() {
            if element.name == name {
                found.push(element);
            }
            let len = stack.len();
            stack.extend(element.elements());
            stack[len..].reverse();
        }
        found
    }

    /// All descendant text with whitespace collapsed
    fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => {
                    out.push(' ');
                    e.collect_text(out);
                    out.push(' ');
                }
            }
        }
    }
}

fn close_element(stack: &mut Vec<Element>) {
    if stack.len() > 1 {
        if let Some(element) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(Node::Element(element));
            }
        }
    }
}

/// Build an element tree under a synthetic root
fn parse_tree(xml: &str) -> std::result::Result<Element, GrobidError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Element::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Element::from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let element = Element::from_start(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Ok(Event::End(_)) => close_element(&mut stack),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| GrobidError::Xml(e.to_string()))?
                    .into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(GrobidError::Xml(format!(
                    "{} at position {}",
                    e,
                    reader.error_position()
                )))
            }
        }
    }

    while stack.len() > 1 {
        close_element(&mut stack);
    }
    let root = stack.pop().unwrap_or_default();
    if root.children.is_empty() {
        return Err(GrobidError::Xml("empty document".to_string()));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_TEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <fileDesc>
      <titleStmt>
        <title level="a" type="main">Deep Learning for Rice Yield Prediction</title>
      </titleStmt>
      <publicationStmt>
        <publisher>Elsevier BV</publisher>
        <date type="published" when="2021-06-15">15 June 2021</date>
      </publicationStmt>
      <sourceDesc>
        <biblStruct>
          <analytic>
            <author><persName><forename type="first">Ana</forename><forename type="middle">M</forename><surname>Putri</surname></persName></author>
            <author><persName><forename>Budi</forename><surname>Santoso</surname></persName></author>
            <idno type="DOI">10.1016/j.compag.2021.106</idno>
          </analytic>
          <monogr>
            <title level="j">Computers and Electronics in Agriculture</title>
          </monogr>
        </biblStruct>
      </sourceDesc>
    </fileDesc>
    <profileDesc>
      <textClass><keywords><term>rice</term><term>yield &amp; climate</term></keywords></textClass>
      <abstract><div><p>We predict rice yield.</p><p>Results are good.</p></div></abstract>
    </profileDesc>
  </teiHeader>
</TEI>"#;

    #[test]
    fn test_parse_header() {
        let header = parse_header_tei(HEADER_TEI).unwrap();
        assert_eq!(
            header.title.as_deref(),
            Some("Deep Learning for Rice Yield Prediction")
        );
        assert_eq!(header.authors, vec!["Ana M Putri", "Budi Santoso"]);
        assert_eq!(header.doi.as_deref(), Some("10.1016/j.compag.2021.106"));
        assert_eq!(header.publication_date.as_deref(), Some("2021-06-15"));
        assert_eq!(header.publisher.as_deref(), Some("Elsevier BV"));
        assert_eq!(
            header.journal.as_deref(),
            Some("Computers and Electronics in Agriculture")
        );
        assert_eq!(
            header.abstract_text.as_deref(),
            Some("We predict rice yield. Results are good.")
        );
        assert_eq!(header.keywords, vec!["rice", "yield & climate"]);
    }

    #[test]
    fn test_short_main_title_falls_through() {
        let xml = r#"<TEI><teiHeader><fileDesc>
            <titleStmt><title type="main">On</title></titleStmt>
            <sourceDesc><biblStruct><analytic><title level="a">Soil Moisture Mapping</title></analytic></biblStruct></sourceDesc>
        </fileDesc></teiHeader></TEI>"#;
        let header = parse_header_tei(xml).unwrap();
        assert_eq!(header.title.as_deref(), Some("Soil Moisture Mapping"));
    }

    #[test]
    fn test_date_text_fallback() {
        let xml = r#"<TEI><teiHeader><publicationStmt><date>2019</date></publicationStmt></teiHeader></TEI>"#;
        let header = parse_header_tei(xml).unwrap();
        assert_eq!(header.publication_date.as_deref(), Some("2019"));
        assert_eq!(header.title, None);
        assert!(header.authors.is_empty());
    }

    #[test]
    fn test_parse_fulltext() {
        let xml = r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><text>
            <body>
              <div><head>Introduction</head><p>First <ref type="bibr">[1]</ref> paragraph.</p><p>Second paragraph.</p></div>
              <div><head>Empty</head></div>
              <div><p>Untitled section text.</p></div>
            </body>
            <back><div><listBibl>
              <biblStruct><analytic><title level="a">Cited Work One</title></analytic></biblStruct>
              <biblStruct><monogr><title level="j">Some Journal</title></monogr></biblStruct>
            </listBibl></div></back>
        </text></TEI>"#;
        let result = parse_fulltext_tei(xml).unwrap();
        assert_eq!(
            result.text,
            "First [1] paragraph.\n\nSecond paragraph.\n\nUntitled section text."
        );
        assert_eq!(result.references, vec!["Cited Work One", "Some Journal"]);
        assert_eq!(result.sections.len(), 2);
        assert_eq!(result.sections[0].title.as_deref(), Some("Introduction"));
        assert_eq!(
            result.sections[0].text(),
            "First [1] paragraph.\n\nSecond paragraph."
        );
        assert_eq!(result.sections[1].title, None);
    }

    #[test]
    fn test_invalid_xml_is_an_error() {
        assert!(matches!(
            parse_header_tei("<TEI><title>unclosed</TEI>"),
            Err(GrobidError::Xml(_))
        ));
        assert!(parse_fulltext_tei("").is_err());
    }
}
