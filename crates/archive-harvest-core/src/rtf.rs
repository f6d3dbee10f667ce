//! Rich-text markup stripping.
//!
//! Reduces an RTF document to its visible plain text. This is a tolerant
//! tokenizer, not a validating parser: unknown control words are dropped,
//! unbalanced braces are forgiven, and whole destination groups that carry
//! no body text (font tables, colour tables, document info, pictures,
//! headers, anything flagged `\*`) are skipped.
//!
//! Input is expected to be already decoded from the archive's single-byte
//! encoding, so a `\'hh` escape maps straight to code point `0xhh`.

const MAX_CONTROL_WORD: usize = 32;

/// Groups whose content is never part of the document text.
const DESTINATIONS: &[&str] = &[
    "aftncn", "aftnsep", "aftnsepc", "annotation", "atnauthor", "atndate", "atnicn", "atnid",
    "atnparent", "atnref", "atntime", "atrfend", "atrfstart", "author", "background",
    "bkmkend", "bkmkstart", "blipuid", "buptim", "category", "colorschememapping", "colortbl",
    "comment", "company", "creatim", "datafield", "datastore", "defchp", "defpap", "do",
    "doccomm", "docvar", "dptxbxtext", "ebcend", "ebcstart", "factoidname", "falt", "fchars",
    "ffdeftext", "ffentrymcr", "ffexitmcr", "ffformat", "ffhelptext", "ffl", "ffname",
    "ffstattext", "fldinst", "fldtype", "fname", "fontemb", "fontfile", "fonttbl", "footer",
    "footerf", "footerl", "footerr", "footnote", "formfield", "ftncn", "ftnsep", "ftnsepc",
    "g", "generator", "gridtbl", "header", "headerf", "headerl", "headerr", "hl", "hlfr",
    "hlinkbase", "hlloc", "hlsrc", "hsv", "htmltag", "info", "keycode", "keywords",
    "latentstyles", "lchars", "levelnumbers", "leveltext", "lfolevel", "linkval", "list",
    "listlevel", "listname", "listoverride", "listoverridetable", "listpicture",
    "liststylename", "listtable", "listtext", "lsdlockedexcept", "mailmerge", "manager",
    "nesttableprops", "nextfile", "nonesttables", "objalias", "objclass", "objdata", "object",
    "objname", "objsect", "objtime", "oldcprops", "oldpprops", "oldsprops", "oldtprops",
    "oleclsid", "operator", "panose", "password", "passwordhash", "pgp", "pgptbl", "picprop",
    "pict", "pn", "pnseclvl", "pntext", "pntxta", "pntxtb", "printim", "private", "propname",
    "protend", "protstart", "protusertbl", "pxe", "result", "revtbl", "revtim", "rsidtbl",
    "rxe", "shp", "shpgrp", "shpinst", "shppict", "shprslt", "shptxt", "sn", "sp", "staticval",
    "stylesheet", "subject", "sv", "svb", "tc", "template", "themedata", "title", "toc", "txe",
    "ud", "upr", "userprops", "wgrffmtfilter", "windowcaption", "writereservation",
    "writereservhash", "xe", "xform", "xmlattrname", "xmlattrvalue", "xmlclose", "xmlname",
    "xmlnstbl", "xmlopen",
];

fn special_word(word: &str) -> Option<&'static str> {
    let s = match word {
        "par" | "line" | "row" => "\n",
        "sect" | "page" => "\n\n",
        "tab" => "\t",
        "cell" | "nestcell" => "|",
        "emdash" => "\u{2014}",
        "endash" => "\u{2013}",
        "emspace" => "\u{2003}",
        "enspace" => "\u{2002}",
        "qmspace" => "\u{2005}",
        "bullet" => "\u{2022}",
        "lquote" => "\u{2018}",
        "rquote" => "\u{2019}",
        "ldblquote" => "\u{201C}",
        "rdblquote" => "\u{201D}",
        _ => return None,
    };
    Some(s)
}

#[derive(Clone, Copy)]
struct GroupState {
    ignorable: bool,
    /// Fallback characters to skip after a `\uN` escape (`\ucN`).
    uc_skip: usize,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            ignorable: false,
            uc_skip: 1,
        }
    }
}

/// Strip RTF markup and return the document's plain text.
pub fn strip_rtf(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(chars.len() / 2);
    let mut stack: Vec<GroupState> = Vec::new();
    let mut state = GroupState::default();
    // Fallback characters still to swallow after a `\u` escape.
    let mut pending_skip = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                pending_skip = 0;
                stack.push(state);
                i += 1;
            }
            '}' => {
                pending_skip = 0;
                state = stack.pop().unwrap_or_default();
                i += 1;
            }
            '\r' | '\n' => i += 1,
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                if next.is_ascii_alphabetic() {
                    let (word, param, consumed) = read_control_word(&chars[i..]);
                    i += consumed;
                    pending_skip = 0;
                    if DESTINATIONS.contains(&word.as_str()) {
                        state.ignorable = true;
                    } else if state.ignorable {
                        // inside a skipped destination
                    } else if let Some(s) = special_word(&word) {
                        out.push_str(s);
                    } else if word == "uc" {
                        state.uc_skip = param.unwrap_or(1).max(0) as usize;
                    } else if word == "u" {
                        if let Some(mut code) = param {
                            if code < 0 {
                                code += 0x10000;
                            }
                            if let Some(c) = char::from_u32(code as u32) {
                                out.push(c);
                            }
                            pending_skip = state.uc_skip;
                        }
                    } else if word == "bin" {
                        i += param.unwrap_or(0).max(0) as usize;
                    }
                } else if next == '\'' {
                    let hex: String = chars.iter().skip(i + 1).take(2).collect();
                    match u8::from_str_radix(&hex, 16) {
                        Ok(byte) if hex.len() == 2 => {
                            i += 3;
                            if pending_skip > 0 {
                                pending_skip -= 1;
                            } else if !state.ignorable {
                                out.push(char::from(byte));
                            }
                        }
                        _ => i += 1,
                    }
                } else {
                    i += 1;
                    pending_skip = 0;
                    match next {
                        '*' => state.ignorable = true,
                        _ if state.ignorable => {}
                        '\\' | '{' | '}' => out.push(next),
                        '~' => out.push('\u{a0}'),
                        '_' => out.push('-'),
                        '\n' | '\r' => out.push('\n'),
                        _ => {}
                    }
                }
            }
            c => {
                i += 1;
                if pending_skip > 0 {
                    pending_skip -= 1;
                } else if !state.ignorable {
                    out.push(c);
                }
            }
        }
    }

    out
}

/// Read `word[-]digits[ ]` starting at a letter. Returns the word, its
/// optional numeric parameter, and how many chars were consumed.
fn read_control_word(chars: &[char]) -> (String, Option<i64>, usize) {
    let mut i = 0;
    while i < chars.len() && i < MAX_CONTROL_WORD && chars[i].is_ascii_alphabetic() {
        i += 1;
    }
    let word: String = chars[..i].iter().collect();

    let param_start = i;
    if chars.get(i) == Some(&'-') && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let param = if i > param_start {
        chars[param_start..i]
            .iter()
            .collect::<String>()
            .parse::<i64>()
            .ok()
    } else {
        None
    };

    if chars.get(i) == Some(&' ') {
        i += 1;
    }
    (word, param, i)
}
