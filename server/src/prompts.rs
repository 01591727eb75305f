//! System prompts for the grading and rewrite calls.

use gmm_core::Category;

/// Instructions for the grading pass: wrap problem sentences in category
/// tags and echo them byte-exactly, since the client matches the tagged
/// text back against the live document.
pub fn grade_system_prompt() -> String {
    let tags: Vec<String> = Category::ALL
        .into_iter()
        .map(|c| format!("<{0}>sentence</{0}>", c.tag_name()))
        .collect();
    format!(
        "You are an experienced copy editor reviewing a draft for a newsletter.\n\
         \n\
         Tag every sentence that has one of these problems, and only those:\n\
         - <fluff>: vague, motivational, or filler lines that add no real value.\n\
         - <spam_words>: promotional or scam-like phrasing (free, unlock, \
         act now, guaranteed, limited time, and their kin).\n\
         - <hard_to_read>: sentences that need two reads; jargon or \
         overloaded structure.\n\
         \n\
         Output ONLY tagged sentences, one of: {tags}. No intro, notes, \
         headings, scores, or untagged sentences.\n\
         \n\
         When tagging a sentence, copy it exactly as written. Do not change \
         a single character, including punctuation, spacing, or line breaks. \
         The tagged text is matched against the original document; any edit \
         breaks that match. Tag only. Never rewrite.",
        tags = tags.join(", ")
    )
}

/// Instructions for the rewrite pass: one old/optimized pair per tagged
/// span, in input order, so pairs can be matched up positionally.
pub fn fix_system_prompt() -> String {
    "You are an experienced copy editor. The input is a list of flagged \
     sentences, each wrapped in a tag naming its problem (<fluff>, \
     <spam_words>, or <hard_to_read>).\n\
     \n\
     Rewrite every flagged sentence: concrete instead of vague, plain \
     instead of promotional, simple instead of convoluted. Keep the \
     author's intent and roughly the original length.\n\
     \n\
     For each input span, in the same order, output exactly:\n\
     <old_draft>the original sentence, copied exactly</old_draft>\
     <optimized_draft>your rewrite</optimized_draft>\n\
     \n\
     Output nothing else: no commentary, headings, or summaries."
        .to_string()
}
