//! Write a sample document
//!
//! Builds a multi-page document with a header, a footer carrying the page
//! count, justified paragraphs, a framed table and an internal link.
//!
//! Usage:
//!   cargo run --bin make_sample
//!   cargo run --bin make_sample -- --output sample.pdf --orientation L --size letter
//!   cargo run --bin make_sample -- --image logo.png --no-compress

use std::path::PathBuf;
use std::process::ExitCode;

use pdf_quill::{
    Align, Border, Document, DocumentConfig, ImagePlacement, LayoutMode, LineFeed, LinkTarget, Result, ZoomMode,
};

const PARAGRAPH: &str = "The quick brown fox jumps over the lazy dog. Pack my box with five dozen \
liquor jugs. How vexingly quick daft zebras jump! Sphinx of black quartz, judge my vow. \
The five boxing wizards jump quickly.";

struct SampleConfig {
    output: PathBuf,
    orientation: String,
    size: String,
    image: Option<String>,
    compress: bool,
}

impl SampleConfig {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = Self {
            output: PathBuf::from("sample.pdf"),
            orientation: "P".to_string(),
            size: "A4".to_string(),
            image: None,
            compress: true,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--output" | "-o" => {
                    i += 1;
                    if i < args.len() {
                        config.output = PathBuf::from(&args[i]);
                    }
                },
                "--orientation" => {
                    i += 1;
                    if i < args.len() {
                        config.orientation = args[i].clone();
                    }
                },
                "--size" => {
                    i += 1;
                    if i < args.len() {
                        config.size = args[i].clone();
                    }
                },
                "--image" => {
                    i += 1;
                    if i < args.len() {
                        config.image = Some(args[i].clone());
                    }
                },
                "--no-compress" => config.compress = false,
                _ => {},
            }
            i += 1;
        }
        config
    }
}

fn build(config: &SampleConfig) -> Result<Document> {
    let doc_config = DocumentConfig::from_strs(&config.orientation, "mm", &config.size, "")?
        .with_compress(config.compress);
    let mut doc = Document::new(doc_config);
    doc.set_title("pdf_quill sample", false);
    doc.set_creator("make_sample", false);
    doc.set_display_mode(ZoomMode::FullWidth, LayoutMode::Continuous);
    doc.alias_nb_pages(None);

    doc.set_header(|d| {
        d.set_font("helvetica", "B", 14.0)?;
        d.cell_format(0.0, 10.0, "Sample document", Border::BOTTOM, LineFeed::NextLine, Align::Center, false, None)?;
        d.ln(Some(4.0));
        Ok(())
    });
    doc.set_footer(|d| {
        d.set_y(-15.0);
        d.set_font("helvetica", "I", 8.0)?;
        let label = format!("Page {}/{{nb}}", d.page_no());
        d.cell_format(0.0, 10.0, &label, Border::empty(), LineFeed::Right, Align::Center, false, None)
    });

    let summary = doc.add_link();
    doc.add_page()?;
    doc.set_font("times", "", 12.0)?;
    doc.write(5.0, "Jump to the ")?;
    doc.set_font("times", "U", 12.0)?;
    doc.write_link(5.0, "summary table", LinkTarget::Internal(summary))?;
    doc.set_font("times", "", 12.0)?;
    doc.write(5.0, ".")?;
    doc.ln(Some(10.0));

    if let Some(image) = &config.image {
        doc.image(image, ImagePlacement::flow(40.0, 0.0), None, None)?;
        doc.ln(Some(4.0));
    }

    for n in 1..=12 {
        doc.set_font("times", "B", 12.0)?;
        doc.cell_format(0.0, 6.0, &format!("Section {}", n), Border::empty(), LineFeed::NextLine, Align::Left, false, None)?;
        doc.set_font("times", "", 12.0)?;
        doc.multi_cell(0.0, 5.0, PARAGRAPH, Border::empty(), Align::Justify, false)?;
        doc.ln(Some(3.0));
    }

    doc.add_page()?;
    doc.set_link(summary, None, None)?;
    doc.set_font("courier", "", 10.0)?;
    doc.set_fill_color(220, 220, 240);
    for (i, row) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
        doc.cell_format(30.0, 7.0, &i.to_string(), Border::ALL, LineFeed::Right, Align::Right, i % 2 == 0, None)?;
        doc.cell_format(60.0, 7.0, row, Border::ALL, LineFeed::NextLine, Align::Left, i % 2 == 0, None)?;
    }
    Ok(doc)
}

fn main() -> ExitCode {
    env_logger::init();
    let config = SampleConfig::from_args();

    let result = build(&config).and_then(|mut doc| doc.output_file(&config.output).map(|_| doc.page_no()));
    match result {
        Ok(pages) => {
            println!("Wrote {} ({} pages)", config.output.display(), pages);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
