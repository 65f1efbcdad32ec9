use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::xml::{local_name, Document, NodeId};

static OPERATOR_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("→", r"\rightarrow"),
        ("←", r"\leftarrow"),
        ("↔", r"\leftrightarrow"),
        ("×", r"\times"),
        ("·", r"\cdot"),
        ("÷", r"\div"),
        ("±", r"\pm"),
        ("∓", r"\mp"),
        ("≤", r"\leq"),
        ("≥", r"\geq"),
        ("≠", r"\neq"),
        ("≈", r"\approx"),
        ("∞", r"\infty"),
        ("∫", r"\int"),
        ("∑", r"\sum"),
        ("∏", r"\prod"),
        ("√", r"\sqrt"),
        ("∂", r"\partial"),
        ("∇", r"\nabla"),
        ("∈", r"\in"),
        ("∉", r"\notin"),
        ("⊂", r"\subset"),
        ("⊃", r"\supset"),
        ("⊆", r"\subseteq"),
        ("⊇", r"\supseteq"),
        ("∪", r"\cup"),
        ("∩", r"\cap"),
        ("∅", r"\emptyset"),
        ("∀", r"\forall"),
        ("∃", r"\exists"),
        ("¬", r"\neg"),
        ("∧", r"\land"),
        ("∨", r"\lor"),
        ("α", r"\alpha"),
        ("β", r"\beta"),
        ("γ", r"\gamma"),
        ("δ", r"\delta"),
        ("ε", r"\epsilon"),
        ("θ", r"\theta"),
        ("λ", r"\lambda"),
        ("μ", r"\mu"),
        ("π", r"\pi"),
        ("σ", r"\sigma"),
        ("φ", r"\phi"),
        ("ω", r"\omega"),
        ("Δ", r"\Delta"),
        ("Σ", r"\Sigma"),
        ("Ω", r"\Omega"),
    ])
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MathTag {
    Math,
    Mrow,
    Mi,
    Mn,
    Mo,
    Mfrac,
    Msub,
    Msup,
    Msubsup,
    Msqrt,
    Mroot,
    Munder,
    Mover,
    Munderover,
    Mtext,
    Mspace,
    Mtable,
    Mtr,
    Mtd,
    Other,
}

impl MathTag {
    fn of(tag: &str) -> MathTag {
        match local_name(tag) {
            "math" => MathTag::Math,
            "mrow" => MathTag::Mrow,
            "mi" => MathTag::Mi,
            "mn" => MathTag::Mn,
            "mo" => MathTag::Mo,
            "mfrac" => MathTag::Mfrac,
            "msub" => MathTag::Msub,
            "msup" => MathTag::Msup,
            "msubsup" => MathTag::Msubsup,
            "msqrt" => MathTag::Msqrt,
            "mroot" => MathTag::Mroot,
            "munder" => MathTag::Munder,
            "mover" => MathTag::Mover,
            "munderover" => MathTag::Munderover,
            "mtext" => MathTag::Mtext,
            "mspace" => MathTag::Mspace,
            "mtable" => MathTag::Mtable,
            "mtr" => MathTag::Mtr,
            "mtd" => MathTag::Mtd,
            _ => MathTag::Other,
        }
    }
}

/// Pretty-prints a MathML subtree as LaTeX. Pure recursive mapping, no
/// state; unrecognized elements fall through to their children.
pub fn mathml_to_latex(doc: &Document, node: NodeId) -> String {
    let join = |doc: &Document, node: NodeId| -> String {
        doc.children(node)
            .iter()
            .map(|&c| mathml_to_latex(doc, c))
            .collect()
    };

    match MathTag::of(doc.tag(node)) {
        MathTag::Math | MathTag::Mrow | MathTag::Mtd | MathTag::Other => join(doc, node),
        MathTag::Mi => {
            let text = doc.text(node).unwrap_or_default();
            if text.chars().count() > 1 {
                format!("\\mathrm{{{text}}}")
            } else {
                text.to_string()
            }
        }
        MathTag::Mn => doc.text(node).unwrap_or_default().to_string(),
        MathTag::Mo => {
            let text = doc.text(node).unwrap_or_default().trim().to_string();
            OPERATOR_MAP
                .get(text.as_str())
                .map(|s| s.to_string())
                .unwrap_or(text)
        }
        MathTag::Mfrac => match doc.children(node) {
            [num, den, ..] => format!(
                "\\frac{{{}}}{{{}}}",
                mathml_to_latex(doc, *num),
                mathml_to_latex(doc, *den)
            ),
            _ => String::new(),
        },
        MathTag::Msub => match doc.children(node) {
            [base, sub, ..] => format!(
                "{}_{{{}}}",
                mathml_to_latex(doc, *base),
                mathml_to_latex(doc, *sub)
            ),
            _ => String::new(),
        },
        MathTag::Msup => match doc.children(node) {
            [base, sup, ..] => format!(
                "{}^{{{}}}",
                mathml_to_latex(doc, *base),
                mathml_to_latex(doc, *sup)
            ),
            _ => String::new(),
        },
        MathTag::Msubsup => match doc.children(node) {
            [base, sub, sup, ..] => format!(
                "{}_{{{}}}^{{{}}}",
                mathml_to_latex(doc, *base),
                mathml_to_latex(doc, *sub),
                mathml_to_latex(doc, *sup)
            ),
            _ => String::new(),
        },
        MathTag::Msqrt => format!("\\sqrt{{{}}}", join(doc, node)),
        MathTag::Mroot => match doc.children(node) {
            [base, index, ..] => format!(
                "\\sqrt[{}]{{{}}}",
                mathml_to_latex(doc, *index),
                mathml_to_latex(doc, *base)
            ),
            _ => String::new(),
        },
        MathTag::Munder => match doc.children(node) {
            [base, under, ..] => format!(
                "\\underset{{{}}}{{{}}}",
                mathml_to_latex(doc, *under),
                mathml_to_latex(doc, *base)
            ),
            _ => String::new(),
        },
        MathTag::Mover => match doc.children(node) {
            [base, over, ..] => format!(
                "\\overset{{{}}}{{{}}}",
                mathml_to_latex(doc, *over),
                mathml_to_latex(doc, *base)
            ),
            _ => String::new(),
        },
        MathTag::Munderover => match doc.children(node) {
            [base, under, over, ..] => {
                let base = mathml_to_latex(doc, *base);
                let under = mathml_to_latex(doc, *under);
                let over = mathml_to_latex(doc, *over);
                // Big operators take real limits instead of stacked scripts.
                if matches!(base.trim(), r"\sum" | r"\int" | r"\prod") {
                    format!("{base}_{{{under}}}^{{{over}}}")
                } else {
                    format!("\\overset{{{over}}}{{\\underset{{{under}}}{{{base}}}}}")
                }
            }
            _ => String::new(),
        },
        MathTag::Mtext => format!("\\text{{{}}}", doc.text(node).unwrap_or_default()),
        MathTag::Mspace => r"\,".to_string(),
        MathTag::Mtable => {
            let rows: Vec<String> = doc
                .children(node)
                .iter()
                .filter(|&&c| MathTag::of(doc.tag(c)) == MathTag::Mtr)
                .map(|&c| mathml_to_latex(doc, c))
                .collect();
            if rows.is_empty() {
                return String::new();
            }
            let columns = rows[0].matches('&').count() + 1;
            format!(
                "\\begin{{array}}{{{}}}\n{}\n\\end{{array}}",
                "c".repeat(columns),
                rows.join("\\\\\n")
            )
        }
        MathTag::Mtr => {
            let cells: Vec<String> = doc
                .children(node)
                .iter()
                .filter(|&&c| MathTag::of(doc.tag(c)) == MathTag::Mtd)
                .map(|&c| mathml_to_latex(doc, c))
                .collect();
            cells.join(" & ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mathml_to_latex;
    use crate::xml::parse;

    #[test]
    fn fraction_of_identifiers() {
        let (doc, root) =
            parse("<math><mfrac><mi>a</mi><mi>b</mi></mfrac></math>").expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "\\frac{a}{b}");
    }

    #[test]
    fn operators_map_to_latex_commands() {
        let (doc, root) =
            parse("<math><mn>2</mn><mo>≤</mo><mn>3</mn><mo>=</mo><mi>π</mi></math>")
                .expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "2\\leq3=π");
    }

    #[test]
    fn multi_char_identifier_wrapped_in_mathrm() {
        let (doc, root) = parse("<math><mi>sin</mi></math>").expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "\\mathrm{sin}");
    }

    #[test]
    fn subscript_superscript_nesting() {
        let (doc, root) = parse(
            "<math><msubsup><mi>x</mi><mn>1</mn><mn>2</mn></msubsup></math>",
        )
        .expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "x_{1}^{2}");
    }

    #[test]
    fn sum_with_limits() {
        let (doc, root) = parse(
            "<math><munderover><mo>∑</mo><mn>0</mn><mi>n</mi></munderover></math>",
        )
        .expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "\\sum_{0}^{n}");
    }

    #[test]
    fn nth_root() {
        let (doc, root) =
            parse("<math><mroot><mi>x</mi><mn>3</mn></mroot></math>").expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "\\sqrt[3]{x}");
    }

    #[test]
    fn matrix_rows_and_cells() {
        let (doc, root) = parse(
            "<math><mtable>\
             <mtr><mtd><mn>1</mn></mtd><mtd><mn>2</mn></mtd></mtr>\
             <mtr><mtd><mn>3</mn></mtd><mtd><mn>4</mn></mtd></mtr>\
             </mtable></math>",
        )
        .expect("parse");
        assert_eq!(
            mathml_to_latex(&doc, root),
            "\\begin{array}{cc}\n1 & 2\\\\\n3 & 4\n\\end{array}"
        );
    }

    #[test]
    fn namespaced_tags_recognized() {
        let (doc, root) =
            parse("<m:math><m:mfrac><m:mi>a</m:mi><m:mn>2</m:mn></m:mfrac></m:math>")
                .expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "\\frac{a}{2}");
    }

    #[test]
    fn unknown_elements_fall_through() {
        let (doc, root) =
            parse("<math><semantics><mi>q</mi></semantics></math>").expect("parse");
        assert_eq!(mathml_to_latex(&doc, root), "q");
    }
}
