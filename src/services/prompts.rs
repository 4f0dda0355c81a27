//! Prompt templates and response schemas for the four lesson generations.
//!
//! The wording and schema field names are what the model is constrained by;
//! parsers in `segmentation`, `explanation` and `assessment` depend on them.

use crate::services::assessment::AssessmentDifficulty;
use crate::services::llm_provider::{GenerateRequest, ResponseSchema};

pub fn segmentation_request(text: &str) -> GenerateRequest {
    let prompt = format!(
        "請將以下繁體中文文本進行分詞，以適合小學中文學習的「詞語」為單位。\n      \
         例如輸入「中文開發」，應回傳 [\"中文\", \"開發\"]。\n      \
         例如輸入「中文開發土耳其」，應回傳 [\"中文\", \"開發\", \"土耳其\"]。\n      \n      \
         待分詞文本：{text}"
    );

    GenerateRequest { prompt, schema: string_array_schema() }
}

pub fn explanation_request(word: &str) -> GenerateRequest {
    let prompt = format!(
        "請詳細解釋繁體中文詞語「{word}」。\n    \
         包含：\n    \
         1. 定義（適合小學生的白話文，簡潔易懂）\n    \
         2. 三個例句（生動且貼近生活）。針對每個句子，請判斷該詞語在該句中的具體詞性（如：名詞、動詞、形容詞）。\n    \
         3. 詞性（該詞語的所有常用詞性，如名詞、動詞、形容詞等）\n    \
         4. 字源趣事（簡單介紹這個字的由來或構造，如有，若無則省略）\n    \
         5. 部首（如果是單字，提供其部首；如果是多字詞，提供第一個字的部首）"
    );

    GenerateRequest { prompt, schema: explanation_schema() }
}

pub fn radical_examples_request(radical: &str) -> GenerateRequest {
    let prompt = format!(
        "列出 8 個以「{radical}」為部首的繁體中文字（限於小學常用字，5-10個左右）。\
         只回傳 JSON 字串陣列，例如 [\"字\", \"符\"]。不要有額外文字。"
    );

    GenerateRequest { prompt, schema: string_array_schema() }
}

pub fn assessment_request(
    words: &[String],
    count: usize,
    difficulty: AssessmentDifficulty,
) -> GenerateRequest {
    let pool = serde_json::to_string(words).unwrap_or_else(|_| "[]".to_string());
    let prompt = format!(
        "請生成 {count} 條中文填充題評估題目。\n    \n    \
         可用詞彙庫：{pool}\n    \n    \
         要求：\n    \
         1. 必須從上述「可用詞彙庫」中選擇詞語作為填充答案。\n    \
         2. 如果題目數量 ({count}) 多於可用詞彙量 ({len})，請重複使用詞彙，但必須創作不同的句子。\n    \
         3. 難度設定：{level} (適合 {band})。句子結構和用詞深度需符合此年級水平。\n    \
         4. 回傳格式為 JSON 陣列。\n    \
         5. 每題包含：\n       \
         - id: 唯一編號\n       \
         - targetWord: 答案詞語\n       \
         - fullSentence: 完整句子\n       \
         - sentenceParts: 將句子以答案詞語切分成的兩部分 [前半句, 後半句]。例如句子是「我喜歡吃飯」，答案是「喜歡」，則 parts 為 [\"我\", \"吃飯\"]。",
        len = words.len(),
        level = difficulty.as_str(),
        band = difficulty.grade_band(),
    );

    GenerateRequest { prompt, schema: assessment_schema() }
}

fn string_array_schema() -> ResponseSchema {
    ResponseSchema::array_of(ResponseSchema::string())
}

fn explanation_schema() -> ResponseSchema {
    let sentence = ResponseSchema::object(
        [
            ("text", ResponseSchema::string()),
            ("posInSentence", ResponseSchema::string().with_description("詞語在該句中的具體詞性")),
        ],
        &["text", "posInSentence"],
    );

    ResponseSchema::object(
        [
            ("word", ResponseSchema::string()),
            ("definition", ResponseSchema::string()),
            ("sentences", ResponseSchema::array_of(sentence)),
            ("pos", string_array_schema()),
            ("etymology", ResponseSchema::string()),
            ("radical", ResponseSchema::string()),
        ],
        &["word", "definition", "sentences", "pos", "radical"],
    )
}

fn assessment_schema() -> ResponseSchema {
    let question = ResponseSchema::object(
        [
            ("id", ResponseSchema::string()),
            ("targetWord", ResponseSchema::string()),
            ("fullSentence", ResponseSchema::string()),
            ("sentenceParts", string_array_schema()),
        ],
        &["id", "targetWord", "fullSentence", "sentenceParts"],
    );

    ResponseSchema::array_of(question)
}
