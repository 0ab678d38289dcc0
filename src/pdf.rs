//! Merge the shipping-label PDFs of one shop into a single document.

use anyhow::{anyhow, Context, Result};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

/// Concatenate the pages of `parts` in order. A single part is returned
/// unchanged.
pub fn merge(parts: &[&[u8]]) -> Result<Vec<u8>> {
    match parts {
        [] => return Err(anyhow!("nothing to merge")),
        [only] => return Ok(only.to_vec()),
        _ => {}
    }

    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (i, raw) in parts.iter().enumerate() {
        let mut doc = Document::load_mem(raw).with_context(|| format!("reading PDF #{}", i + 1))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        // get_pages is keyed by page number, so this keeps page order.
        for (_, page_id) in doc.get_pages() {
            let page = doc
                .get_object(page_id)
                .with_context(|| format!("PDF #{} lost page object {:?}", i + 1, page_id))?;
            pages.push((page_id, page.clone()));
        }
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut tree: Option<(ObjectId, Object)> = None;

    for (id, object) in objects {
        let kind = type_name(&object).map(<[u8]>::to_vec);
        match kind.as_deref() {
            Some(b"Catalog") => {
                catalog.get_or_insert((id, object));
            }
            Some(b"Pages") => {
                let Ok(dict) = object.as_dict() else { continue };
                let mut dict = dict.clone();
                if let Some((_, Object::Dictionary(prev))) = &tree {
                    dict.extend(prev);
                }
                let keep = tree.as_ref().map(|(id, _)| *id).unwrap_or(id);
                tree = Some((keep, Object::Dictionary(dict)));
            }
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let (catalog_id, catalog) = catalog.ok_or_else(|| anyhow!("no catalog in any PDF"))?;
    let (tree_id, tree) = tree.ok_or_else(|| anyhow!("no page tree in any PDF"))?;

    let count = pages.len() as u32;
    let mut kids = Vec::with_capacity(pages.len());
    for (id, page) in pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", tree_id);
            merged.objects.insert(id, Object::Dictionary(dict));
            kids.push(Object::Reference(id));
        }
    }

    let mut tree = tree.as_dict().map_err(|e| anyhow!("page tree: {e}"))?.clone();
    tree.set("Count", count);
    tree.set("Kids", kids);
    merged.objects.insert(tree_id, Object::Dictionary(tree));

    let mut catalog = catalog.as_dict().map_err(|e| anyhow!("catalog: {e}"))?.clone();
    catalog.set("Pages", tree_id);
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.keys().map(|(n, _)| *n).max().unwrap_or(0);
    merged.renumber_objects();
    merged.compress();

    let mut out = Vec::new();
    merged.save_to(&mut out).context("writing merged PDF")?;
    Ok(out)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    /// A PDF with `n` blank pages.
    fn blank_pdf(n: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..n)
            .map(|_| {
                let content = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                let media_box: Vec<Object> = [0, 0, 288, 432].into_iter().map(Object::Integer).collect();
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => media_box,
                    "Contents" => content,
                }))
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n as u32,
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn pages_of_every_part_end_up_in_one_document() {
        let a = blank_pdf(1);
        let b = blank_pdf(2);
        let merged = merge(&[a.as_slice(), b.as_slice()]).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn single_part_is_passed_through() {
        let a = blank_pdf(1);
        assert_eq!(merge(&[a.as_slice()]).unwrap(), a);
    }

    #[test]
    fn garbage_is_an_error() {
        let a = blank_pdf(1);
        assert!(merge(&[a.as_slice(), b"not a pdf".as_slice()]).is_err());
    }
}
