//! Page-range splitting of a multi-student exam PDF.
//!
//! Student `i` receives source pages `[i*k, (i+1)*k)` in their original
//! order. Trailing pages that do not fill a booklet are handled by the
//! configured [`TruncationPolicy`]. The source is never modified.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use examsplit_core::error::CoreError;
use examsplit_core::pages::{BookletLayout, TruncationPolicy};
use examsplit_core::types::DbId;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::PipelineError;
use crate::scratch::ScratchDir;

/// One student's booklet, cut from the exam and parked in scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentAnswerDocument {
    pub exam_id: DbId,
    /// Zero-based position of the booklet in the source document.
    pub booklet_index: u32,
    pub page_count: u32,
    /// Scratch file holding the booklet PDF.
    pub path: PathBuf,
}

/// Result of splitting one upload.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub layout: BookletLayout,
    pub students: Vec<StudentAnswerDocument>,
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Split raw PDF bytes into booklets of `pages_per_student` pages.
///
/// Synchronous and CPU bound: call it from a blocking task.
pub fn split_pdf(
    source: &[u8],
    pages_per_student: u32,
    policy: TruncationPolicy,
) -> Result<(BookletLayout, Vec<Vec<u8>>), CoreError> {
    let document = Document::load_mem(source)
        .map_err(|e| CoreError::InvalidDocument(format!("cannot parse PDF: {e}")))?;

    // Page object ids in document order.
    let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(CoreError::InvalidDocument("document has no pages".into()));
    }

    let layout = BookletLayout::compute(page_ids.len() as u32, pages_per_student)?;
    if layout.student_count == 0 {
        return Err(CoreError::InvalidDocument(format!(
            "{} page(s) do not fill a single booklet of {} pages",
            layout.total_pages, layout.pages_per_student
        )));
    }
    policy.check(&layout)?;

    let mut booklets = Vec::with_capacity(layout.student_count as usize);
    for index in 0..layout.student_count {
        let range = layout.booklet_range(index);
        let pages = &page_ids[range.start as usize..range.end as usize];

        let mut booklet = extract_pages(&document, pages).map_err(|e| {
            CoreError::InvalidDocument(format!("cannot extract booklet {index}: {e}"))
        })?;

        let mut bytes = Vec::new();
        booklet.save_to(&mut bytes).map_err(|e| {
            CoreError::Internal(format!("cannot serialize booklet {index}: {e}"))
        })?;
        booklets.push(bytes);
    }

    Ok((layout, booklets))
}

/// Build a new document holding only `pages` of `source`.
///
/// Copies the pages and every object they reach, without walking back up
/// the page tree, so the cost follows the size of the booklet rather than
/// the size of the source. Inherited attributes are pinned on each page.
fn extract_pages(source: &Document, pages: &[ObjectId]) -> Result<Document, lopdf::Error> {
    let mut booklet = Document::with_version(source.version.clone());
    let pages_id: ObjectId = (source.max_id + 1, 0);
    let catalog_id: ObjectId = (source.max_id + 2, 0);
    let kept: BTreeSet<ObjectId> = pages.iter().copied().collect();

    let mut pending = Vec::new();
    for &page_id in pages {
        let mut page = source.get_dictionary(page_id)?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, &page, key) {
                    page.set(key, value);
                }
            }
        }
        page.set("Parent", pages_id);

        let page = Object::Dictionary(page);
        collect_references(&page, &mut pending);
        booklet.objects.insert(page_id, page);
    }

    while let Some(id) = pending.pop() {
        if booklet.objects.contains_key(&id) {
            continue;
        }
        // Dangling references read as null.
        let Ok(object) = source.get_object(id) else {
            continue;
        };
        // Links to pages outside the booklet, or to the source page tree,
        // are left dangling.
        if !kept.contains(&id) && is_page_tree_node(object) {
            continue;
        }
        collect_references(object, &mut pending);
        booklet.objects.insert(id, object.clone());
    }

    let kids: Vec<Object> = pages.iter().map(|&id| Object::Reference(id)).collect();
    booklet.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages.len() as i64),
        }),
    );
    booklet.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    booklet.trailer.set("Root", catalog_id);
    booklet.max_id = catalog_id.0;
    booklet.renumber_objects();

    Ok(booklet)
}

/// Nearest ancestor value of an inheritable page attribute.
fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Bounded walk: malformed files can loop.
    for _ in 0..64 {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn is_page_tree_node(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Page") | Ok(b"Pages")
    )
}

/// Push every object id referenced from `object`, except `Parent` links.
fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => collect_dictionary_references(dict, out),
        Object::Stream(stream) => collect_dictionary_references(&stream.dict, out),
        _ => {}
    }
}

fn collect_dictionary_references(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, out);
        }
    }
}

/// Split the source file of an upload into per-student scratch files.
pub async fn split_to_scratch(
    source_path: &Path,
    scratch: &ScratchDir,
    exam_id: DbId,
    pages_per_student: u32,
    policy: TruncationPolicy,
) -> Result<SplitOutcome, PipelineError> {
    let source = tokio::fs::read(source_path).await?;
    let (layout, booklets) =
        tokio::task::spawn_blocking(move || split_pdf(&source, pages_per_student, policy))
            .await??;

    let mut students = Vec::with_capacity(booklets.len());
    for (index, bytes) in booklets.into_iter().enumerate() {
        let booklet_index = index as u32;
        let path = scratch.booklet_path(booklet_index);
        tokio::fs::write(&path, bytes).await?;
        students.push(StudentAnswerDocument {
            exam_id,
            booklet_index,
            page_count: pages_per_student,
            path,
        });
    }

    tracing::debug!(
        exam_id,
        total_pages = layout.total_pages,
        students = layout.student_count,
        dropped_pages = layout.dropped_pages,
        "Exam split into booklets",
    );

    Ok(SplitOutcome { layout, students })
}

#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::{dictionary, Document, Object};

    /// A PDF of `pages` blank pages. Page `i` (zero-based) is `100 + i`
    /// points wide so tests can tell pages apart after splitting.
    pub fn sample_pdf(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..pages)
            .map(|i| {
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(100 + i as i64),
                        Object::Integer(842),
                    ],
                });
                Object::Reference(page_id)
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(pages as i64),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Widths of the pages of `bytes`, in page order.
    pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_dictionary(*id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }
}
