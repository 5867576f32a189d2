//! Pull-based reading of protocol XML documents.
//!
//! This is a thin, namespace-aware layer over `quick-xml` shaped for the
//! strict grammars of the protocol payloads: the caller walks the document
//! element by element, stating at every step exactly what it is prepared
//! to accept. Anything else is malformed.

use std::{error, fmt, io, str};
use std::borrow::Cow;
use quick_xml::events::{BytesStart, Event};


//------------ Reader --------------------------------------------------------

/// An XML reader.
///
/// This struct holds all state necessary for parsing an XML document.
pub struct Reader<R: io::BufRead> {
    reader: quick_xml::Reader<R>,
    buf: Vec<u8>,
    ns_buf: Vec<u8>,
}

impl<R: io::BufRead> Reader<R> {
    /// Creates a new reader from an underlying reader.
    pub fn new(reader: R) -> Self {
        let mut reader = quick_xml::Reader::from_reader(reader);
        reader.trim_text(true);
        Reader {
            reader,
            buf: Vec::new(),
            ns_buf: Vec::new(),
        }
    }

    /// Parses the start of the document.
    ///
    /// Skips over the XML declaration, comments, and a doctype if present,
    /// and hands the document element to `op`.
    pub fn start<F, E>(&mut self, op: F) -> Result<Content, E>
    where F: FnOnce(Element) -> Result<(), E>, E: From<Error> {
        loop {
            self.buf.clear();
            let (ns, event) = self.reader.read_namespaced_event(
                &mut self.buf, &mut self.ns_buf
            ).map_err(Into::into)?;
            match event {
                Event::Start(start) => {
                    op(Element::new(start, ns))?;
                    return Ok(Content { empty: false })
                }
                Event::Empty(start) => {
                    op(Element::new(start, ns))?;
                    return Ok(Content { empty: true })
                }
                Event::Comment(_) | Event::Decl(_) | Event::DocType(_) => { }
                _ => return Err(Error::Malformed.into())
            }
        }
    }

    /// Parses the end of the document.
    ///
    /// Anything other than comments before the end of file is malformed.
    pub fn end(&mut self) -> Result<(), Error> {
        loop {
            self.buf.clear();
            match self.reader.read_event(&mut self.buf)? {
                Event::Eof => return Ok(()),
                Event::Comment(_) => { }
                _ => return Err(Error::Malformed)
            }
        }
    }
}


//------------ Element -------------------------------------------------------

/// The start of an element.
pub struct Element<'b, 'n> {
    start: BytesStart<'b>,
    ns: Option<&'n [u8]>,
}

impl<'b, 'n> Element<'b, 'n> {
    fn new(start: BytesStart<'b>, ns: Option<&'n [u8]>) -> Self {
        Element { start, ns }
    }

    /// Returns the qualified name of the element.
    pub fn name(&self) -> Name {
        Name::new(self.ns, self.start.local_name())
    }

    /// Checks that the element has the given name.
    ///
    /// The namespace must match exactly; an element without a namespace
    /// never matches a qualified name.
    pub fn verify_name(&self, expected: Name) -> Result<(), Error> {
        if self.name() == expected {
            Ok(())
        }
        else {
            Err(Error::Malformed)
        }
    }

    /// Processes the attributes of the element.
    ///
    /// The closure receives each attribute’s raw name and its value.
    /// Namespace declarations are skipped. Qualified attributes other than
    /// `xml:lang` are not used by the protocol and arrive at the closure
    /// verbatim, which makes it reject them.
    pub fn attributes<F, E>(&self, mut op: F) -> Result<(), E>
    where
        F: FnMut(&[u8], AttrValue) -> Result<(), E>,
        E: From<Error>
    {
        for attr in self.start.attributes() {
            let attr = attr.map_err(|_| Error::Malformed)?;
            if attr.key == b"xmlns" || attr.key.starts_with(b"xmlns:") {
                continue
            }
            op(attr.key, AttrValue(attr))?;
        }
        Ok(())
    }
}


//------------ Content -------------------------------------------------------

/// The content of an element currently being read.
pub struct Content {
    /// Did the element use the empty-element syntax?
    empty: bool,
}

impl Content {
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Takes the next child element, failing if there is none.
    pub fn take_element<R, F, E>(
        &mut self, reader: &mut Reader<R>, op: F
    ) -> Result<Content, E>
    where R: io::BufRead, F: FnOnce(Element) -> Result<(), E>, E: From<Error> {
        match self.take_opt_element(reader, op)? {
            Some(content) => Ok(content),
            None => Err(Error::Malformed.into())
        }
    }

    /// Takes the next child element if there is one.
    ///
    /// Returns `None` when the end tag of the current element follows
    /// instead; the current element counts as exhausted thereafter.
    pub fn take_opt_element<R, F, E>(
        &mut self, reader: &mut Reader<R>, op: F
    ) -> Result<Option<Content>, E>
    where R: io::BufRead, F: FnOnce(Element) -> Result<(), E>, E: From<Error> {
        if self.empty {
            return Ok(None)
        }
        loop {
            reader.buf.clear();
            let (ns, event) = reader.reader.read_namespaced_event(
                &mut reader.buf, &mut reader.ns_buf
            ).map_err(Into::into)?;
            match event {
                Event::Start(start) => {
                    op(Element::new(start, ns))?;
                    return Ok(Some(Content { empty: false }))
                }
                Event::Empty(start) => {
                    op(Element::new(start, ns))?;
                    return Ok(Some(Content { empty: true }))
                }
                Event::End(_) => {
                    self.empty = true;
                    return Ok(None)
                }
                Event::Comment(_) => { }
                _ => return Err(Error::Malformed.into())
            }
        }
    }

    /// Takes the text content of the current element.
    pub fn take_text<R, F, T, E>(
        &mut self, reader: &mut Reader<R>, op: F
    ) -> Result<T, E>
    where
        R: io::BufRead,
        F: FnOnce(Text) -> Result<T, E>,
        E: From<Error>
    {
        if self.empty {
            return Err(Error::Malformed.into())
        }
        loop {
            reader.buf.clear();
            let event = reader.reader.read_event(
                &mut reader.buf
            ).map_err(Into::into)?;
            match event {
                Event::Text(text) => return op(Text(text)),
                Event::Comment(_) => { }
                _ => return Err(Error::Malformed.into())
            }
        }
    }

    /// Takes the end tag of the current element.
    ///
    /// An element read in empty-element syntax has its end implied.
    pub fn take_end<R: io::BufRead>(
        &mut self, reader: &mut Reader<R>
    ) -> Result<(), Error> {
        if self.empty {
            return Ok(())
        }
        loop {
            reader.buf.clear();
            match reader.reader.read_event(&mut reader.buf)? {
                Event::End(_) => {
                    self.empty = true;
                    return Ok(())
                }
                Event::Comment(_) => { }
                _ => return Err(Error::Malformed)
            }
        }
    }
}


//------------ Name ----------------------------------------------------------

/// The expanded name of an element.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Name<'n, 'l> {
    namespace: Option<&'n [u8]>,
    local: &'l [u8],
}

impl<'n, 'l> Name<'n, 'l> {
    fn new(namespace: Option<&'n [u8]>, local: &'l [u8]) -> Self {
        Name { namespace, local }
    }

    /// Creates a name within a namespace.
    pub const fn qualified(namespace: &'n [u8], local: &'l [u8]) -> Self {
        Name { namespace: Some(namespace), local }
    }

    pub fn namespace(&self) -> Option<&[u8]> {
        self.namespace
    }

    pub fn local(&self) -> &[u8] {
        self.local
    }
}

impl<'n, 'l> fmt::Debug for Name<'n, 'l> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Name(")?;
        if let Some(ns) = self.namespace {
            write!(f, "{}:", String::from_utf8_lossy(ns))?;
        }
        write!(f, "{})", String::from_utf8_lossy(self.local))
    }
}


//------------ AttrValue -----------------------------------------------------

/// The value of an attribute.
#[derive(Clone)]
pub struct AttrValue<'a>(quick_xml::events::attributes::Attribute<'a>);

impl<'a> AttrValue<'a> {
    /// Converts the value via its `FromStr` implementation.
    ///
    /// The value must be ASCII-only, which everything in the protocol
    /// grammar is.
    pub fn ascii_into<T: str::FromStr>(self) -> Result<T, Error> {
        let s = self.0.unescaped_value().map_err(Error::from)?;
        if !s.is_ascii() {
            return Err(Error::Malformed)
        }
        let s = unsafe { str::from_utf8_unchecked(s.as_ref()) };
        T::from_str(s).map_err(|_| Error::Malformed)
    }
}


//------------ Text ----------------------------------------------------------

/// The text content of an element.
pub struct Text<'a>(quick_xml::events::BytesText<'a>);

impl<'a> Text<'a> {
    pub fn to_ascii(&self) -> Result<Cow<str>, Error> {
        match self.0.unescaped()? {
            Cow::Borrowed(s) => {
                if !s.is_ascii() {
                    return Err(Error::Malformed)
                }
                Ok(Cow::Borrowed(unsafe { str::from_utf8_unchecked(s) }))
            }
            Cow::Owned(s) => {
                if !s.is_ascii() {
                    return Err(Error::Malformed)
                }
                Ok(Cow::Owned(
                    unsafe { String::from_utf8_unchecked(s) }
                ))
            }
        }
    }

    /// Converts the text via its `FromStr` implementation.
    pub fn ascii_into<T: str::FromStr>(&self) -> Result<T, Error> {
        T::from_str(&self.to_ascii()?).map_err(|_| Error::Malformed)
    }

    /// Decodes the text as `xsd:base64Binary` content.
    ///
    /// Whitespace between the alphabet characters is allowed and skipped.
    pub fn base64_decode(&self) -> Result<Vec<u8>, Error> {
        let base64 = self.to_ascii().map(|text| {
            text.as_bytes().iter()
                .filter(|ch| !b" \n\t\r\x0b\x0c=".contains(ch))
                .copied()
                .collect::<Vec<_>>()
        })?;
        base64::decode_config(base64, base64::STANDARD_NO_PAD)
            .map_err(|_| Error::Base64)
    }
}


//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    /// The underlying XML was broken.
    Xml(quick_xml::Error),

    /// The document did not follow the expected grammar.
    Malformed,

    /// Binary content was not valid Base64.
    Base64,
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Xml(ref err) => err.fmt(f),
            Error::Malformed => f.write_str("malformed XML"),
            Error::Base64 => f.write_str("invalid Base64 content"),
        }
    }
}

impl error::Error for Error { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &[u8] = b"urn:example";

    #[test]
    fn walks_elements_and_text() {
        let xml = concat!(
            "<?xml version=\"1.0\"?>\n",
            "<outer xmlns=\"urn:example\" a=\"1\">\n",
            "   <inner>aGk=</inner>\n",
            "   <leaf/>\n",
            "</outer>\n",
        );
        let mut reader = Reader::new(xml.as_bytes());
        let mut attr_seen = false;
        let mut outer = reader.start(|element| {
            element.verify_name(Name::qualified(NS, b"outer"))?;
            element.attributes(|name, value| {
                assert_eq!(name, b"a");
                assert_eq!(value.ascii_into::<u8>()?, 1);
                attr_seen = true;
                Ok::<_, Error>(())
            })
        }).unwrap();
        assert!(attr_seen);

        let mut inner = outer.take_element(&mut reader, |element| {
            element.verify_name(Name::qualified(NS, b"inner"))
        }).unwrap();
        let data = inner.take_text(
            &mut reader, |text| text.base64_decode()
        ).unwrap();
        assert_eq!(data, b"hi");
        inner.take_end(&mut reader).unwrap();

        let mut leaf = outer.take_element(&mut reader, |element| {
            element.verify_name(Name::qualified(NS, b"leaf"))
        }).unwrap();
        leaf.take_end(&mut reader).unwrap();

        assert!(outer.take_opt_element(
            &mut reader, |_| Ok::<_, Error>(())
        ).unwrap().is_none());
        outer.take_end(&mut reader).unwrap();
        reader.end().unwrap();
    }

    #[test]
    fn rejects_foreign_namespace() {
        let xml = "<outer xmlns=\"urn:other\"/>";
        let mut reader = Reader::new(xml.as_bytes());
        assert!(reader.start(|element| {
            element.verify_name(Name::qualified(NS, b"outer"))
        }).is_err());
    }

    #[test]
    fn base64_allows_whitespace_and_padding() {
        let xml = "<e>aG\n Vs bG8 =</e>";
        let mut reader = Reader::new(xml.as_bytes());
        let mut content = reader.start(
            |_| Ok::<_, Error>(())
        ).unwrap();
        let data = content.take_text(
            &mut reader, |text| text.base64_decode()
        ).unwrap();
        assert_eq!(data, b"hello");
    }
}
