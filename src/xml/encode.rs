//! Canonical writing of protocol XML documents.
//!
//! The provisioning payload has one blessed textual form: an XML
//! declaration line, elements indented by three spaces per nesting level
//! with one element per line, attributes in a fixed order, inline text
//! content, and a trailing newline. Emitting exactly this form makes the
//! output reproducible byte for byte, which the test suites of both peers
//! of the protocol rely upon.
//!
//! The writer is a thin state machine over any [`io::Write`]: elements are
//! opened with [`Writer::element`], given attributes, and then closed
//! either empty or with nested content.

use std::fmt;
use std::io;

const INDENT: &str = "   ";


//------------ Writer --------------------------------------------------------

/// A canonical XML writer.
pub struct Writer<W: io::Write> {
    writer: W,
    depth: usize,
    declared: bool,
}

impl<W: io::Write> Writer<W> {
    /// Creates a new writer emitting to `writer`.
    pub fn new(writer: W) -> Self {
        Writer { writer, depth: 0, declared: false }
    }

    /// Starts the document element.
    ///
    /// Writes the XML declaration first if it hasn’t been written yet.
    pub fn element(
        &mut self, name: &'static str
    ) -> Result<Element<'_, W>, io::Error> {
        if !self.declared {
            self.writer.write_all(
                b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"
            )?;
            self.declared = true;
        }
        write!(self.writer, "<{}", name)?;
        Ok(Element { writer: self, name })
    }

    /// Finishes the document.
    pub fn done(self) -> Result<(), io::Error> {
        Ok(())
    }

    fn indent(&mut self) -> Result<(), io::Error> {
        for _ in 0..self.depth {
            self.writer.write_all(INDENT.as_bytes())?;
        }
        Ok(())
    }

    fn attr_escaped(&mut self, value: &str) -> Result<(), io::Error> {
        for ch in value.chars() {
            match ch {
                '&' => self.writer.write_all(b"&amp;")?,
                '<' => self.writer.write_all(b"&lt;")?,
                '>' => self.writer.write_all(b"&gt;")?,
                '"' => self.writer.write_all(b"&quot;")?,
                _ => write!(self.writer, "{}", ch)?,
            }
        }
        Ok(())
    }

    fn text_escaped(&mut self, value: &str) -> Result<(), io::Error> {
        for ch in value.chars() {
            match ch {
                '&' => self.writer.write_all(b"&amp;")?,
                '<' => self.writer.write_all(b"&lt;")?,
                '>' => self.writer.write_all(b"&gt;")?,
                _ => write!(self.writer, "{}", ch)?,
            }
        }
        Ok(())
    }
}


//------------ Element -------------------------------------------------------

/// An element whose start tag is currently being written.
pub struct Element<'a, W: io::Write> {
    writer: &'a mut Writer<W>,
    name: &'static str,
}

impl<'a, W: io::Write> Element<'a, W> {
    /// Adds an attribute.
    ///
    /// Attributes are written in call order; it is the caller’s business
    /// to call in the canonical order.
    pub fn attr(
        self, name: &str, value: &impl fmt::Display
    ) -> Result<Self, io::Error> {
        write!(self.writer.writer, " {}=\"", name)?;
        self.writer.attr_escaped(&value.to_string())?;
        self.writer.writer.write_all(b"\"")?;
        Ok(self)
    }

    /// Adds an attribute if the value is present.
    pub fn attr_opt(
        self, name: &str, value: Option<&impl fmt::Display>
    ) -> Result<Self, io::Error> {
        match value {
            Some(value) => self.attr(name, value),
            None => Ok(self),
        }
    }

    /// Closes the element without any content, as `<name/>`.
    pub fn finish(self) -> Result<(), io::Error> {
        self.writer.writer.write_all(b"/>\n")
    }

    /// Provides the element’s content through the closure, then closes it.
    ///
    /// If the closure produces no output at all, the element is written
    /// self-closing, identical to [`finish`][Self::finish].
    pub fn content<F>(self, op: F) -> Result<(), io::Error>
    where F: FnOnce(&mut Content<'_, W>) -> Result<(), io::Error> {
        let Element { writer, name } = self;
        let mut content = Content { writer, state: ContentState::Unopened };
        op(&mut content)?;
        let Content { writer, state } = content;
        match state {
            ContentState::Unopened => {
                writer.writer.write_all(b"/>\n")
            }
            ContentState::Text => {
                write!(writer.writer, "</{}>\n", name)
            }
            ContentState::Children => {
                writer.depth -= 1;
                writer.indent()?;
                write!(writer.writer, "</{}>\n", name)
            }
        }
    }
}


//------------ Content -------------------------------------------------------

/// The content of an open element.
pub struct Content<'a, W: io::Write> {
    writer: &'a mut Writer<W>,
    state: ContentState,
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum ContentState {
    /// The start tag hasn’t been closed with `>` yet.
    Unopened,

    /// The element holds inline text.
    Text,

    /// The element holds child elements, each on its own line.
    Children,
}

impl<'a, W: io::Write> Content<'a, W> {
    /// Starts a child element on its own, indented line.
    pub fn element(
        &mut self, name: &'static str
    ) -> Result<Element<'_, W>, io::Error> {
        if self.state == ContentState::Unopened {
            self.writer.writer.write_all(b">\n")?;
            self.writer.depth += 1;
            self.state = ContentState::Children;
        }
        self.writer.indent()?;
        write!(self.writer.writer, "<{}", name)?;
        Ok(Element { writer: &mut *self.writer, name })
    }

    /// Writes escaped inline text.
    pub fn raw(&mut self, text: &str) -> Result<(), io::Error> {
        if self.state == ContentState::Unopened {
            self.writer.writer.write_all(b">")?;
            self.state = ContentState::Text;
        }
        self.writer.text_escaped(text)
    }

    /// Writes binary data as inline Base64 text.
    ///
    /// Uses the standard alphabet without any line wrapping.
    pub fn base64(&mut self, data: &[u8]) -> Result<(), io::Error> {
        if self.state == ContentState::Unopened {
            self.writer.writer.write_all(b">")?;
            self.state = ContentState::Text;
        }
        self.writer.writer.write_all(base64::encode(data).as_bytes())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F>(op: F) -> String
    where F: FnOnce(&mut Writer<&mut Vec<u8>>) -> Result<(), io::Error> {
        let mut target = Vec::new();
        let mut writer = Writer::new(&mut target);
        op(&mut writer).unwrap();
        writer.done().unwrap();
        String::from_utf8(target).unwrap()
    }

    #[test]
    fn empty_element_self_closes() {
        let xml = render(|writer| {
            writer.element("outer")?.attr("a", &"1")?.content(|_| Ok(()))
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <outer a=\"1\"/>\n"
        );
    }

    #[test]
    fn nested_elements_are_indented() {
        let xml = render(|writer| {
            writer.element("outer")?.content(|content| {
                content.element("inner")?.content(|content| {
                    content.element("leaf")?.finish()
                })
            })
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <outer>\n   <inner>\n      <leaf/>\n   </inner>\n</outer>\n"
        );
    }

    #[test]
    fn text_content_stays_inline() {
        let xml = render(|writer| {
            writer.element("status")?.content(|content| content.raw("1101"))
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <status>1101</status>\n"
        );
    }

    #[test]
    fn base64_is_not_wrapped() {
        let data = [0u8; 96];
        let xml = render(|writer| {
            writer.element("blob")?.content(|content| {
                content.base64(&data)
            })
        });
        let body = xml.lines().nth(1).unwrap();
        assert_eq!(
            body, format!("<blob>{}</blob>", base64::encode(&data[..]))
        );
    }

    #[test]
    fn escapes_attributes_and_text() {
        let xml = render(|writer| {
            writer.element("e")?.attr("a", &"x<\"&>y")?.content(|content| {
                content.raw("a<b&c")
            })
        });
        assert!(xml.contains("a=\"x&lt;&quot;&amp;&gt;y\""));
        assert!(xml.contains(">a&lt;b&amp;c</e>"));
    }
}
