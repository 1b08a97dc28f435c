//! rforge – command-line résumé → PDF exporter.
//!
//! Usage:
//!   rforge <input.json> [output.pdf] [--template professional] [--title "Resume"]
//!
//! The input is a résumé document unless `--content` is given, in which case
//! it is a pre-rendered content block. If `output.pdf` is omitted the PDF is
//! written next to the input file with the same stem.

use std::{env, fs, path::PathBuf, process, sync::Arc};

use resume_forge::compositor::Sidebar;
use resume_forge::content::ContentBlock;
use resume_forge::fonts::{FontManager, FontVariant};
use resume_forge::geometry::PageGeometry;
use resume_forge::pipeline::{export_content, layout_report, PipelineConfig};
use resume_forge::resume::Resume;
use resume_forge::templates::{get_template, render_resume};

struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    content: bool,
    sample: bool,
    layout_only: bool,
    template: String,
    title: Option<String>,
    font: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    let args = parse_args(&argv);

    let mut fonts = FontManager::with_system_fonts();
    if let Some(path) = &args.font {
        if let Err(e) = fonts.load_font_file(path, FontVariant::REGULAR) {
            eprintln!("Error loading font: {e}");
            process::exit(1);
        }
    }
    let fonts = Arc::new(fonts);

    let (content, sidebar, person) = match load_content(&args, &fonts) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if args.layout_only {
        match layout_report(&content, &PageGeometry::a4()) {
            Ok(report) => println!("{}", report.to_json()),
            Err(e) => {
                eprintln!("Error computing layout: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let output = args.output.clone().unwrap_or_else(|| match &args.input {
        Some(input) => input.with_extension("pdf"),
        None => PathBuf::from(PipelineConfig::filename_for(&person)),
    });

    // Default title: stem of the output filename.
    let default_title = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Resume")
        .to_string();

    let config = PipelineConfig {
        title: args.title.clone().unwrap_or(default_title),
        filename: output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resume.pdf")
            .to_string(),
        ..PipelineConfig::default()
    };

    let artifact = match export_content(content, sidebar, &config, fonts) {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = artifact.save_as(&output) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{})",
        output.display(),
        artifact.bytes.len(),
        artifact.page_count,
        if artifact.page_count == 1 { "" } else { "s" }
    );
}

/// Content block to export, its sidebar, and the person's name.
fn load_content(
    args: &Args,
    fonts: &FontManager,
) -> Result<(ContentBlock, Sidebar, String), resume_forge::Error> {
    let json = match &args.input {
        Some(path) => Some(fs::read_to_string(path)?),
        None => None,
    };

    if args.content {
        let json = json.unwrap_or_default();
        return Ok((ContentBlock::from_json(&json)?, Sidebar::None, String::new()));
    }

    let resume = match json {
        Some(json) => Resume::from_json(&json)?,
        None => Resume::sample(),
    };
    let template = get_template(&args.template);
    let content = render_resume(&resume, template, fonts);
    Ok((content, template.sidebar, resume.header.full_name))
}

fn parse_args(argv: &[String]) -> Args {
    let prog = argv.first().map(String::as_str).unwrap_or("rforge");
    let mut args = Args {
        input: None,
        output: None,
        content: false,
        sample: false,
        layout_only: false,
        template: "professional".to_string(),
        title: None,
        font: None,
    };
    let mut positional = 0usize;

    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--content" | "-c" => args.content = true,
            "--sample" => args.sample = true,
            "--layout" | "-l" => args.layout_only = true,
            "--template" | "-T" | "--title" | "-t" | "--font" | "-f" => {
                let Some(value) = iter.next() else {
                    eprintln!("Missing value for {arg}");
                    print_usage(prog);
                    process::exit(1);
                };
                match arg.as_str() {
                    "--template" | "-T" => args.template = value.clone(),
                    "--title" | "-t" => args.title = Some(value.clone()),
                    _ => args.font = Some(PathBuf::from(value)),
                }
            }
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => {
                match positional {
                    0 => args.input = Some(PathBuf::from(path)),
                    1 => args.output = Some(PathBuf::from(path)),
                    _ => {
                        eprintln!("Unexpected argument: {path}");
                        print_usage(prog);
                        process::exit(1);
                    }
                }
                positional += 1;
            }
        }
    }

    // With --sample the only positional is the output path.
    if args.sample && args.output.is_none() {
        args.output = args.input.take();
    }
    if args.input.is_none() && !args.sample {
        eprintln!("Error: no input file specified.");
        print_usage(prog);
        process::exit(1);
    }
    if args.content && args.input.is_none() {
        eprintln!("Error: --content needs an input file.");
        process::exit(1);
    }
    args
}

fn print_usage(prog: &str) {
    eprintln!("rforge – résumé to PDF exporter (resume-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.json> [output.pdf] [--template id] [--title \"Resume\"]");
    eprintln!("  {prog} --sample [output.pdf]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.json>   Résumé document (or content block with --content)");
    eprintln!("  [output.pdf]   Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --content, -c  Input is a pre-rendered content block");
    eprintln!("  --template, -T Résumé template: professional (default) or classic");
    eprintln!("  --title, -t    Document title in PDF metadata (default: output filename stem)");
    eprintln!("  --font, -f     TTF/OTF file to use for body text");
    eprintln!("  --layout, -l   Print the page layout as JSON instead of exporting");
    eprintln!("  --sample       Use the built-in sample résumé");
    eprintln!("  --help         Print this message");
}
