//! JUnit XML ingestion.
//!
//! Accepts a `<testsuites>` document or a bare `<testsuite>` root. Nested
//! suites are flattened in the order they open. A case is failed when it
//! carries a `<failure>` or `<error>` child, skipped when it carries a
//! `<skipped>` child, and passed otherwise.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{FinderError, FinderResult};
use crate::model::{TestCase, TestOutcome, TestSuite};

/// Parse one JUnit report.
pub fn ingest(bytes: &[u8]) -> FinderResult<Vec<TestSuite>> {
    let mut reader = Reader::from_reader(bytes);
    let mut parser = SuiteParser::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            junit_error(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => {
                parser.open(&e)?;
                parser.depth += 1;
            }
            Event::Empty(e) => {
                parser.open(&e)?;
                parser.close(e.local_name().as_ref())?;
            }
            Event::End(e) => {
                parser.depth = parser.depth.saturating_sub(1);
                parser.close(e.local_name().as_ref())?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    parser.finish()
}

#[derive(Default)]
struct SuiteParser {
    suites: Vec<TestSuite>,
    /// Indices into `suites` of the suites currently open.
    open_suites: Vec<usize>,
    case: Option<TestCase>,
    depth: usize,
    seen_root: bool,
}

impl SuiteParser {
    fn open(&mut self, element: &BytesStart<'_>) -> FinderResult<()> {
        let tag = element.local_name();
        let tag = tag.as_ref();

        if !self.seen_root {
            if tag != b"testsuites" && tag != b"testsuite" {
                return Err(junit_error(format!(
                    "unexpected root element <{}>",
                    String::from_utf8_lossy(tag)
                )));
            }
            self.seen_root = true;
        }

        match tag {
            b"testsuite" => {
                let name = attribute(element, "name")?.unwrap_or_default();
                self.open_suites.push(self.suites.len());
                self.suites.push(TestSuite {
                    name,
                    cases: Vec::new(),
                });
            }
            b"testcase" => {
                if self.case.is_some() {
                    return Err(junit_error("nested <testcase> elements"));
                }
                let name = attribute(element, "name")?
                    .ok_or_else(|| junit_error("<testcase> without a name attribute"))?;
                self.case = Some(TestCase::new(name, TestOutcome::Passed));
            }
            b"failure" | b"error" => {
                if let Some(case) = self.case.as_mut() {
                    case.outcome = TestOutcome::Failed;
                }
            }
            b"skipped" => {
                if let Some(case) = self.case.as_mut() {
                    if case.outcome != TestOutcome::Failed {
                        case.outcome = TestOutcome::Skipped;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, tag: &[u8]) -> FinderResult<()> {
        match tag {
            b"testsuite" => {
                self.open_suites.pop();
            }
            b"testcase" => {
                let Some(case) = self.case.take() else {
                    return Ok(());
                };
                let Some(&index) = self.open_suites.last() else {
                    return Err(junit_error(format!(
                        "<testcase name=\"{}\"> outside of a <testsuite>",
                        case.name
                    )));
                };
                self.suites[index].cases.push(case);
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> FinderResult<Vec<TestSuite>> {
        if !self.seen_root {
            return Err(junit_error("document has no <testsuite> element"));
        }
        if self.depth != 0 {
            return Err(junit_error("unexpected end of document"));
        }
        Ok(self.suites)
    }
}

fn attribute(element: &BytesStart<'_>, key: &str) -> FinderResult<Option<String>> {
    let Some(attr) = element
        .try_get_attribute(key)
        .map_err(|e| junit_error(format!("bad attribute: {e}")))?
    else {
        return Ok(None);
    };
    let value = attr
        .unescape_value()
        .map_err(|e| junit_error(format!("bad {key} attribute: {e}")))?;
    Ok(Some(value.into_owned()))
}

fn junit_error(message: impl Into<String>) -> FinderError {
    FinderError::Junit {
        message: message.into(),
    }
}
