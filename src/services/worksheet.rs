use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::services::segmentation::is_cjk_ideograph;
use crate::services::stroke_data::{CharacterStrokes, StrokeDataClient};

pub const WORKSHEET_TITLE: &str = "中文生詞練習";
const STROKE_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Worksheet {
    pub title: &'static str,
    pub header_fields: [&'static str; 3],
    pub entries: Vec<WorksheetEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetEntry {
    pub number: usize,
    pub word: String,
    pub characters: Vec<WorksheetCharacter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetCharacter {
    pub character: String,
    pub stroke_count: Option<usize>,
    pub strokes: Option<CharacterStrokes>,
}

/// Builds the printable sheet for `words`, fetching each distinct ideograph once.
pub async fn build_worksheet(words: &[String], strokes: &StrokeDataClient) -> Worksheet {
    let mut distinct: Vec<char> = Vec::new();
    for c in words.iter().flat_map(|w| w.chars()).filter(|c| is_cjk_ideograph(*c)) {
        if !distinct.contains(&c) {
            distinct.push(c);
        }
    }

    let lookup: HashMap<char, Option<CharacterStrokes>> = stream::iter(distinct)
        .map(|c| async move { (c, strokes.lookup(c).await) })
        .buffer_unordered(STROKE_FETCH_CONCURRENCY)
        .collect()
        .await;

    assemble(words, &lookup)
}

fn assemble(words: &[String], lookup: &HashMap<char, Option<CharacterStrokes>>) -> Worksheet {
    let entries = words
        .iter()
        .enumerate()
        .map(|(i, word)| WorksheetEntry {
            number: i + 1,
            word: word.clone(),
            characters: word
                .chars()
                .map(|c| {
                    let strokes = lookup.get(&c).cloned().flatten();
                    WorksheetCharacter {
                        character: c.to_string(),
                        stroke_count: strokes.as_ref().map(CharacterStrokes::stroke_count),
                        strokes,
                    }
                })
                .collect(),
        })
        .collect();

    Worksheet { title: WORKSHEET_TITLE, header_fields: ["姓名", "日期", "班別"], entries }
}
