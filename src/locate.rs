//! Finding the image XObjects a document's pages draw.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashSet};

/// Unique image objects referenced from any page's XObject resources.
///
/// Images shared between pages appear once, in the order they are first
/// seen walking the pages front to back.
pub fn locate_images(doc: &Document) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    page_images(doc)
        .into_values()
        .flatten()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Image objects referenced by each page, keyed by page number.
pub fn page_images(doc: &Document) -> BTreeMap<u32, Vec<ObjectId>> {
    doc.get_pages()
        .into_iter()
        .map(|(page_number, page_id)| (page_number, images_on_page(doc, page_id)))
        .collect()
}

fn images_on_page(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Some(resources) = page_resources(doc, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (_, value) in xobjects.iter() {
        if let Object::Reference(id) = value {
            if is_image(doc, *id) && !images.contains(id) {
                images.push(*id);
            }
        }
    }
    images
}

/// Resources of a page, following `/Parent` for inherited resources.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut visited = HashSet::new();
    let mut node_id = page_id;

    while visited.insert(node_id) {
        let node = doc.get_dictionary(node_id).ok()?;
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => node_id = *parent_id,
            _ => return None,
        }
    }

    None
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        },
        _ => None,
    }
}

fn is_image(doc: &Document, id: ObjectId) -> bool {
    match doc.get_object(id) {
        Ok(Object::Stream(stream)) => matches!(
            stream.dict.get(b"Subtype"),
            Ok(Object::Name(name)) if name == b"Image"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn image_stream() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        )
    }

    fn form_stream() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            },
            b"0 0 m 10 10 l S".to_vec(),
        )
    }

    /// Builds a document whose pages carry the given resources (or none).
    fn document(pages: Vec<Option<Object>>) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = pages
            .into_iter()
            .map(|resources| {
                let mut page = dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                };
                if let Some(resources) = resources {
                    page.set("Resources", resources);
                }
                doc.add_object(page).into()
            })
            .collect();

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn xobjects(entries: Vec<(&str, ObjectId)>) -> Object {
        let mut xobject = Dictionary::new();
        for (name, id) in entries {
            xobject.set(name, id);
        }
        Object::Dictionary(dictionary! { "XObject" => xobject })
    }

    #[test]
    fn shared_image_is_located_once() {
        let mut doc = document(vec![None, None, None]);
        let shared = doc.add_object(image_stream());
        let other = doc.add_object(image_stream());

        let pages = doc.get_pages();
        for (page_number, image) in [(1, shared), (2, other), (3, shared)] {
            doc.get_dictionary_mut(pages[&page_number])
                .unwrap()
                .set("Resources", xobjects(vec![("Im1", image)]));
        }

        assert_eq!(locate_images(&doc), vec![shared, other]);

        let per_page = page_images(&doc);
        assert_eq!(per_page[&1], vec![shared]);
        assert_eq!(per_page[&2], vec![other]);
        assert_eq!(per_page[&3], vec![shared]);
    }

    #[test]
    fn forms_and_missing_resources_are_excluded() {
        let mut doc = document(vec![None, None]);
        let image = doc.add_object(image_stream());
        let form = doc.add_object(form_stream());

        let pages = doc.get_pages();
        let first = pages[&1];
        doc.get_dictionary_mut(first)
            .unwrap()
            .set("Resources", xobjects(vec![("Im1", image), ("Fm1", form)]));

        assert_eq!(locate_images(&doc), vec![image]);
        assert!(page_images(&doc)[&2].is_empty());
    }

    #[test]
    fn inherited_resources_are_followed() {
        let mut doc = document(vec![None]);
        let image = doc.add_object(image_stream());
        let resources_id = doc.add_object(xobjects(vec![("Im0", image)]));

        let pages_id = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
        doc.get_dictionary_mut(pages_id)
            .unwrap()
            .set("Resources", resources_id);

        assert_eq!(locate_images(&doc), vec![image]);
    }

    #[test]
    fn text_only_document_has_no_images() {
        let doc = document(vec![Some(Object::Dictionary(Dictionary::new()))]);
        assert!(locate_images(&doc).is_empty());
    }
}
