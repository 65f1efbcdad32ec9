//! Table-of-contents and metadata carried through the translation pipeline
//! as a simple attribute+child XML shape, so the same segmentation and
//! submission machinery that handles document bodies can handle them.

use crate::xml::{Document, NodeId};

use super::metadata::MetadataField;
use super::toc::Toc;

const TOC_ITEM_TAG: &str = "toc-item";
const TOC_LIST_TAG: &str = "toc-list";
const TITLE_TAG: &str = "title";
const METADATA_LIST_TAG: &str = "metadata-list";
const FIELD_TAG: &str = "field";
const FIELD_TAG_ATTR: &str = "tag";

pub fn encode_toc(doc: &mut Document, toc: &Toc) -> NodeId {
    let elem = doc.create_element(TOC_ITEM_TAG);
    if let Some(href) = &toc.href {
        doc.set_attr(elem, "href", href);
    }
    if let Some(fragment) = &toc.fragment {
        doc.set_attr(elem, "fragment", fragment);
    }
    if let Some(id) = &toc.id {
        doc.set_attr(elem, "id", id);
    }
    let title = doc.create_element(TITLE_TAG);
    doc.set_text(title, Some(toc.title.clone()));
    doc.append_child(elem, title);

    for child in &toc.children {
        let child_elem = encode_toc(doc, child);
        doc.append_child(elem, child_elem);
    }
    elem
}

pub fn decode_toc(doc: &Document, elem: NodeId) -> Toc {
    let mut toc = Toc {
        href: doc.attr(elem, "href").map(str::to_string),
        fragment: doc.attr(elem, "fragment").map(str::to_string),
        id: doc.attr(elem, "id").map(str::to_string),
        ..Toc::default()
    };
    for &child in doc.children(elem) {
        if doc.tag(child) == TITLE_TAG {
            toc.title = doc.text(child).unwrap_or_default().trim().to_string();
        } else if doc.tag(child) == TOC_ITEM_TAG {
            toc.children.push(decode_toc(doc, child));
        }
    }
    toc
}

pub fn encode_toc_list(doc: &mut Document, list: &[Toc]) -> NodeId {
    let elem = doc.create_element(TOC_LIST_TAG);
    for toc in list {
        let child = encode_toc(doc, toc);
        doc.append_child(elem, child);
    }
    elem
}

pub fn decode_toc_list(doc: &Document, elem: NodeId) -> Vec<Toc> {
    doc.children(elem)
        .iter()
        .filter(|&&c| doc.tag(c) == TOC_ITEM_TAG)
        .map(|&c| decode_toc(doc, c))
        .collect()
}

pub fn encode_metadata(doc: &mut Document, fields: &[MetadataField]) -> NodeId {
    let elem = doc.create_element(METADATA_LIST_TAG);
    for field in fields {
        let field_elem = doc.create_element(FIELD_TAG);
        doc.set_attr(field_elem, FIELD_TAG_ATTR, &field.tag_name);
        doc.set_text(field_elem, Some(field.text.clone()));
        doc.append_child(elem, field_elem);
    }
    elem
}

pub fn decode_metadata(doc: &Document, elem: NodeId) -> Vec<MetadataField> {
    doc.children(elem)
        .iter()
        .filter(|&&c| doc.tag(c) == FIELD_TAG)
        .map(|&c| MetadataField {
            tag_name: doc.attr(c, FIELD_TAG_ATTR).unwrap_or_default().to_string(),
            text: doc.text(c).unwrap_or_default().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        decode_metadata, decode_toc, decode_toc_list, encode_metadata, encode_toc,
        encode_toc_list,
    };
    use crate::epub::{MetadataField, Toc};
    use crate::xml::{parse, render, Document};

    #[test]
    fn encode_simple_toc() {
        let toc = Toc {
            title: "Chapter 1".to_string(),
            href: Some("chapter1.xhtml".to_string()),
            fragment: Some("section1".to_string()),
            id: Some("ch1".to_string()),
            children: Vec::new(),
        };

        let mut doc = Document::new();
        let elem = encode_toc(&mut doc, &toc);

        assert_eq!(doc.tag(elem), "toc-item");
        assert_eq!(doc.attr(elem, "href"), Some("chapter1.xhtml"));
        assert_eq!(doc.attr(elem, "fragment"), Some("section1"));
        assert_eq!(doc.attr(elem, "id"), Some("ch1"));
        let title = doc.children(elem)[0];
        assert_eq!(doc.tag(title), "title");
        assert_eq!(doc.text(title), Some("Chapter 1"));
    }

    #[test]
    fn optional_fields_stay_absent() {
        let toc = Toc::new("Introduction");
        let mut doc = Document::new();
        let elem = encode_toc(&mut doc, &toc);

        assert_eq!(doc.attr(elem, "href"), None);
        assert_eq!(doc.attr(elem, "fragment"), None);
        assert_eq!(doc.attr(elem, "id"), None);
    }

    #[test]
    fn decode_nested_toc() {
        let markup = "<toc-item href=\"part1.xhtml\" id=\"part1\">\
                      <title>Part 1</title>\
                      <toc-item href=\"ch1.xhtml\" id=\"ch1\"><title>Chapter 1</title></toc-item>\
                      <toc-item href=\"ch2.xhtml\" id=\"ch2\"><title>Chapter 2</title></toc-item>\
                      </toc-item>";
        let (doc, elem) = parse(markup).expect("parse");
        let toc = decode_toc(&doc, elem);

        assert_eq!(toc.title, "Part 1");
        assert_eq!(toc.href.as_deref(), Some("part1.xhtml"));
        assert_eq!(toc.children.len(), 2);
        assert_eq!(toc.children[0].title, "Chapter 1");
        assert_eq!(toc.children[1].href.as_deref(), Some("ch2.xhtml"));
    }

    #[test]
    fn deeply_nested_toc_round_trips() {
        let toc = Toc {
            title: "Book".to_string(),
            children: vec![
                Toc {
                    title: "Part 1".to_string(),
                    children: vec![Toc::new("Chapter 1"), Toc::new("Chapter 2")],
                    ..Toc::default()
                },
                Toc {
                    title: "Part 2".to_string(),
                    children: vec![Toc {
                        title: "Chapter 3".to_string(),
                        href: Some("ch3.xhtml".to_string()),
                        fragment: Some("s3".to_string()),
                        ..Toc::default()
                    }],
                    ..Toc::default()
                },
            ],
            ..Toc::default()
        };

        let mut doc = Document::new();
        let elem = encode_toc(&mut doc, &toc);
        assert_eq!(decode_toc(&doc, elem), toc);
    }

    #[test]
    fn toc_list_round_trips() {
        let list = vec![
            Toc {
                title: "Chapter 1".to_string(),
                href: Some("ch1.xhtml".to_string()),
                id: Some("ch1".to_string()),
                ..Toc::default()
            },
            Toc {
                title: "Part 1".to_string(),
                children: vec![Toc::new("Chapter 2")],
                ..Toc::default()
            },
        ];

        let mut doc = Document::new();
        let elem = encode_toc_list(&mut doc, &list);
        assert_eq!(doc.tag(elem), "toc-list");
        assert_eq!(decode_toc_list(&doc, elem), list);
    }

    #[test]
    fn metadata_round_trips_in_order() {
        let fields = vec![
            MetadataField::new("title", "The Little Prince"),
            MetadataField::new("creator", "Antoine de Saint-Exupéry"),
            MetadataField::new("creator", "Richard Howard"),
            MetadataField::new("subject", "Fiction"),
        ];

        let mut doc = Document::new();
        let elem = encode_metadata(&mut doc, &fields);
        assert_eq!(doc.tag(elem), "metadata-list");
        assert_eq!(decode_metadata(&doc, elem), fields);
    }

    #[test]
    fn empty_metadata_list() {
        let mut doc = Document::new();
        let elem = encode_metadata(&mut doc, &[]);
        assert!(decode_metadata(&doc, elem).is_empty());
    }

    #[test]
    fn special_characters_survive_serialization() {
        let fields = vec![MetadataField::new(
            "title",
            "Title with <special> & \"quotes\" & 中文",
        )];
        let toc = Toc {
            title: "Chapter <1> & \"Quotes\"".to_string(),
            href: Some("special.xhtml".to_string()),
            ..Toc::default()
        };

        let mut doc = Document::new();
        let meta_elem = encode_metadata(&mut doc, &fields);
        let toc_elem = encode_toc(&mut doc, &toc);

        let (doc2, meta2) = parse(&render(&doc, meta_elem)).expect("reparse metadata");
        assert_eq!(decode_metadata(&doc2, meta2), fields);

        let (doc3, toc2) = parse(&render(&doc, toc_elem)).expect("reparse toc");
        assert_eq!(decode_toc(&doc3, toc2).title, toc.title);
    }
}
