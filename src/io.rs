use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree;

/// Prepare a Newick string for `phylotree`.
///
/// Removes bracketed comments and annotations (MrBayes `[&U]`, BEAST
/// `[&rate=0.123]`) and whitespace outside quoted labels. Everything after the
/// first `;` is dropped.
pub fn clean_newick(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut comment_depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in newick.chars() {
        if let Some(q) = quote {
            result.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '[' => comment_depth += 1,
            ']' if comment_depth > 0 => comment_depth -= 1,
            _ if comment_depth > 0 => {}
            '\'' | '"' => {
                quote = Some(ch);
                result.push(ch);
            }
            c if c.is_whitespace() => {}
            ';' => {
                result.push(ch);
                break;
            }
            _ => result.push(ch),
        }
    }

    result
}

/// Trees and the optional TRANSLATE table of a NEXUS `TREES` block.
#[derive(Debug, Default)]
pub struct NexusTrees {
    pub translate: HashMap<String, String>,
    pub trees: Vec<NexusTree>,
}

#[derive(Debug, Clone)]
pub struct NexusTree {
    pub name: String,
    pub newick: String,
}

/// Parse MrBayes / BEAST style NEXUS content.
///
/// Expected structure:
/// ```text
/// begin trees;
///    translate
///       1 A,
///       2 'B c';
///    tree gen.1 = [&U] (1:0.1,2:0.2,...);
/// end;
/// ```
pub fn parse_nexus_trees(content: &str) -> NexusTrees {
    NexusTrees {
        translate: parse_translate_block(content),
        trees: collect_tree_lines(content),
    }
}

fn collect_tree_lines(content: &str) -> Vec<NexusTree> {
    content
        .lines()
        .map(str::trim)
        .skip_while(|line| !is_tree_line(line))
        .take_while(|line| !line.to_ascii_uppercase().starts_with("END;"))
        .filter(|line| is_tree_line(line))
        .filter_map(|line| {
            let (header, body) = split_tree_line(line)?;
            let name = header.split_whitespace().nth(1).unwrap_or("").to_string();
            Some(NexusTree {
                name,
                newick: body.trim().to_string(),
            })
        })
        .collect()
}

/// Split `tree NAME [comments] = NEWICK` at the first `=` outside brackets,
/// so BEAST headers like `tree STATE_0 [&lnP=-1234.5] = ...` stay intact.
fn split_tree_line(line: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in line.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some((line[..i].trim(), &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn is_tree_line(line: &str) -> bool {
    let upper = line.to_ascii_uppercase();
    upper.starts_with("TREE ") || upper.starts_with("UTREE ")
}

fn parse_translate_block(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut lines = content
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1);

    // STRUCTURE:
    // 1 '1959.M.CD.59.ZR59',
    // 2 t2;
    for line in lines.by_ref() {
        if line.starts_with(';') {
            break;
        }
        let last = line.ends_with(';');
        let entry = line.trim_end_matches([',', ';']);
        let mut parts = entry.split_whitespace();
        if let (Some(id), Some(label)) = (parts.next(), parts.next()) {
            map.insert(
                id.to_string(),
                label.trim_matches(['\'', '"']).to_string(),
            );
        }
        if last {
            break;
        }
    }
    map
}

/// Replace leaf labels of a cleaned Newick string through a TRANSLATE table.
///
/// Only labels directly after `(` or `,` are leaves; internal node labels
/// after `)` are left alone, as are labels missing from the table.
pub fn translate_newick(newick: &str, translate: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(newick.len());
    let mut rest = newick;
    let mut at_leaf = true;
    while let Some(ch) = rest.chars().next() {
        if at_leaf && !matches!(ch, '(' | ')' | ',' | ':' | ';') {
            let end = match ch {
                '\'' | '"' => rest[1..].find(ch).map_or(rest.len(), |i| i + 2),
                _ => rest.find([':', ',', ')', ';']).unwrap_or(rest.len()),
            };
            let label = &rest[..end];
            match translate.get(label.trim_matches(['\'', '"'])) {
                Some(name) => out.push_str(name),
                None => out.push_str(label),
            }
            rest = &rest[end..];
            at_leaf = false;
            continue;
        }
        at_leaf = matches!(ch, '(' | ',');
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Rename leaves through a NEXUS TRANSLATE table; unmapped names are kept.
pub fn rename_leaf_nodes(phylo_tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in phylo_tree.get_leaves() {
        if let Ok(node) = phylo_tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n.trim())) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// Open a file for buffered reading. `-` is stdin; `.gz` files are
/// decompressed on the fly.
pub fn open_input<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let f = File::open(p)?;
    if is_gz(p) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Create a buffered writer. `-` is stdout; paths ending in `.gz` are
/// gzip-compressed.
pub fn create_output<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let f = File::create(p)?;
    if is_gz(p) {
        let enc = GzEncoder::new(f, Compression::default());
        Ok(Box::new(BufWriter::new(enc)))
    } else {
        Ok(Box::new(BufWriter::new(f)))
    }
}

fn is_gz(p: &Path) -> bool {
    p.to_string_lossy().ends_with(".gz")
}
