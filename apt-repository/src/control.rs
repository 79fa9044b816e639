// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

[ControlParagraph::parse_str()] parses the `control` file found inside `.deb`
archives. Lines it cannot interpret are skipped.
*/

use {
    crate::error::Result,
    std::{borrow::Cow, fmt::Display, io::Write},
};

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str].
    ///
    /// The value's original file formatting (including newlines and leading whitespace
    /// of continuation lines) is included.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Whether this field has the given name (case insensitive compare).
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Obtain an iterator of lines in the value.
    ///
    /// Leading whitespace from each line is stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|x| x.trim_start())
    }

    fn append_continuation(&mut self, line: &str) {
        let value = self.value.to_mut();
        value.push('\n');
        value.push_str(line);
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        // A value made only of continuation lines starts on the next line.
        if self.value.starts_with('\n') {
            writer.write_all(b":")?;
        } else {
            writer.write_all(b": ")?;
        }
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

impl<'a> Display for ControlField<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.value.starts_with('\n') {
            writeln!(f, "{}:{}", self.name, self.value)
        } else {
            writeln!(f, "{}: {}", self.name, self.value)
        }
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// Paragraphs can only contain a single occurrence of a field and this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph is empty.
    ///
    /// Empty is defined by the lack of any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The number of fields in this paragraph.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already exists, the old value
    /// is replaced by the incoming one, keeping the position of the old field.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.is_named(field.name())) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the value of a field, parsed as a [u64].
    pub fn field_u64(&self, name: &str) -> Option<Result<u64>> {
        self.field_str(name)
            .map(|x| x.trim().parse::<u64>().map_err(|e| e.into()))
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. An extra newline
    /// terminating the paragraph is not written.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }

    /// Parse the text of a single paragraph control file.
    ///
    /// For every line, the text before the first `:` with trailing whitespace
    /// removed is the field name and the trimmed text after it is the value. Lines
    /// beginning with a space or tab continue the most recently parsed field. Other
    /// lines without a usable `:` are ignored, as are continuation lines with no
    /// field to continue.
    ///
    /// Names are matched case insensitively. A repeated name replaces the earlier
    /// field, name spelling included, at the earlier field's position.
    pub fn parse_str(text: &str) -> ControlParagraph<'static> {
        let mut paragraph = ControlParagraph::default();
        // Index of the field continuation lines attach to.
        let mut current: Option<usize> = None;

        for line in text.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                let line = line.trim_end();

                if let Some(field) = current.and_then(|i| paragraph.fields.get_mut(i)) {
                    if !line.trim().is_empty() {
                        field.append_continuation(line);
                    }
                }

                continue;
            }

            let (name, value) = match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => (name.trim_end(), value.trim()),
                _ => {
                    current = None;
                    continue;
                }
            };

            paragraph.set_field_from_string(
                Cow::Owned(name.to_string()),
                Cow::Owned(value.to_string()),
            );
            current = paragraph.fields.iter().position(|f| f.is_named(name));
        }

        paragraph
    }
}

impl<'a> Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            write!(f, "{}", field)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::error::RepositoryError, indoc::indoc};

    #[test]
    fn parse_simple() {
        let p = ControlParagraph::parse_str(indoc! {"
            Package: hello
            Version: 1.0
            Architecture: amd64
        "});

        assert_eq!(p.len(), 3);
        assert_eq!(p.field_str("Package"), Some("hello"));
        assert_eq!(p.field_str("package"), Some("hello"));
        assert_eq!(
            p.iter_fields().map(|f| f.name()).collect::<Vec<_>>(),
            vec!["Package", "Version", "Architecture"]
        );
    }

    #[test]
    fn parse_value_trimming_and_first_colon() {
        let p = ControlParagraph::parse_str("Homepage:   https://example.com:8080/x  \n");

        assert_eq!(p.field_str("Homepage"), Some("https://example.com:8080/x"));
    }

    #[test]
    fn parse_ignores_unusable_lines() {
        let p = ControlParagraph::parse_str(indoc! {"
            garbage without colon
            : value without key
            Package: hello

            Version: 1.0
        "});

        assert_eq!(p.len(), 2);
        assert_eq!(p.field_str("Package"), Some("hello"));
        assert_eq!(p.field_str("Version"), Some("1.0"));
    }

    #[test]
    fn parse_duplicate_replaces_in_place() {
        let p = ControlParagraph::parse_str(indoc! {"
            Package: hello
            Version: 1.0
            package: goodbye
        "});

        assert_eq!(p.len(), 2);
        assert_eq!(p.field_str("Package"), Some("goodbye"));
        assert_eq!(
            p.iter_fields().map(|f| f.name()).collect::<Vec<_>>(),
            vec!["package", "Version"]
        );
    }

    #[test]
    fn parse_name_trailing_whitespace_trimmed() {
        let p = ControlParagraph::parse_str("Package \t: hello\nVersion:1.0\n");

        assert_eq!(
            p.iter_fields().map(|f| f.name()).collect::<Vec<_>>(),
            vec!["Package", "Version"]
        );
        assert_eq!(p.field_str("package"), Some("hello"));
        assert_eq!(p.field_str("Version"), Some("1.0"));
    }

    #[test]
    fn parse_continuation_lines() {
        let p = ControlParagraph::parse_str(indoc! {"
            Package: hello
            Description: short summary
             Longer description.
             .
            \tTabbed line.
            Maintainer: Someone <someone@example.com>
        "});

        let description = p.field("Description").unwrap();
        assert_eq!(
            description.value_str(),
            "short summary\n Longer description.\n .\n\tTabbed line."
        );
        assert_eq!(
            description.iter_lines().collect::<Vec<_>>(),
            vec!["short summary", "Longer description.", ".", "Tabbed line."]
        );
        assert_eq!(
            p.field_str("Maintainer"),
            Some("Someone <someone@example.com>")
        );
    }

    #[test]
    fn parse_orphan_continuation_ignored() {
        let p = ControlParagraph::parse_str(" orphan: line\nPackage: hello\n");

        assert_eq!(p.len(), 1);
        assert_eq!(p.field_str("Package"), Some("hello"));
    }

    #[test]
    fn write_round_trip() -> Result<()> {
        let text = indoc! {"
            Package: hello
            Description: short
             long
        "};
        let p = ControlParagraph::parse_str(text);

        let mut buf = vec![];
        p.write(&mut buf)?;
        assert_eq!(String::from_utf8_lossy(&buf), text);
        assert_eq!(p.to_string(), text);

        Ok(())
    }

    #[test]
    fn write_value_only_continuations() {
        let p = ControlParagraph::parse_str("Conffiles:\n /etc/hello.conf abc\n");

        assert_eq!(p.to_string(), "Conffiles:\n /etc/hello.conf abc\n");
    }

    #[test]
    fn field_u64() {
        let p = ControlParagraph::parse_str("Installed-Size: 42\nBogus: abc\n");

        assert_eq!(p.field_u64("Installed-Size").unwrap().unwrap(), 42);
        assert!(matches!(
            p.field_u64("Bogus"),
            Some(Err(RepositoryError::ParseInt(_)))
        ));
        assert!(p.field_u64("Missing").is_none());
    }
}
