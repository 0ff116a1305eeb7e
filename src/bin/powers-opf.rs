use anyhow::{format_err, Result};
use clap::{Args, Parser, Subcommand};
use powers_opf::cases::{by_name, CASE_NAMES};
use powers_opf::{
    rundcpf, runpf, solve, Case, CaseReport, FlowLim, IpmOptBuilder, OpfOptBuilder, PfOptBuilder,
    Solver,
};
use spsolve::rlu::RLU;

/// Power flow and optimal power flow.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// AC power flow (Newton's method)
    #[clap(name = "pf")]
    PowerFlow(PfArgs),

    /// DC power flow
    #[clap(name = "dcpf")]
    DcPowerFlow(CaseArgs),

    /// DC optimal power flow
    #[clap(name = "dcopf")]
    DcOpf(OpfArgs),

    /// AC optimal power flow
    #[clap(name = "acopf")]
    AcOpf(OpfArgs),
}

#[derive(Args)]
struct CaseArgs {
    /// Name of a built-in case.
    #[arg(long, default_value = "three-bus")]
    case: String,
}

#[derive(Args)]
struct PfArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Termination tolerance on per unit P & Q mismatch.
    #[arg(long)]
    tol: Option<f64>,

    /// Maximum number of iterations.
    #[arg(long)]
    max_it: Option<usize>,
}

#[derive(Args)]
struct OpfArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Quantity limited by branch flow constraints.
    #[arg(long, value_enum, default_value_t = FlowLim::S)]
    flow_lim: FlowLim,

    /// Enforce branch angle difference limits.
    #[arg(long, default_value_t = false)]
    ang_lim: bool,

    /// Convert polynomial costs to piecewise linear with this many points.
    #[arg(long)]
    use_pwl: Option<usize>,

    /// Maximum number of interior point iterations.
    #[arg(long)]
    max_it: Option<usize>,

    /// Use step-length control.
    #[arg(long, default_value_t = false)]
    step_control: bool,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    }
}

fn load_case(args: &CaseArgs) -> Result<Case> {
    by_name(&args.case).ok_or_else(|| {
        format_err!(
            "unknown case {:?} (expected one of: {})",
            args.case,
            CASE_NAMES.join(", ")
        )
    })
}

fn execute(cli: &Cli) -> Result<()> {
    let solver = RLU::default();

    let case = match &cli.command {
        Commands::PowerFlow(args) => {
            let mut case = load_case(&args.case)?;
            let mut opt = PfOptBuilder::default();
            if let Some(tol) = args.tol {
                opt.tolerance(tol);
            }
            if let Some(max_it) = args.max_it {
                opt.max_it(max_it);
            }
            let (status, iterations) = runpf(&mut case, &opt.build()?, &solver)?;
            if !status.converged() {
                return Err(format_err!(
                    "power flow did not converge ({:?} after {} iterations)",
                    status,
                    iterations
                ));
            }
            case
        }
        Commands::DcPowerFlow(args) => {
            let mut case = load_case(args)?;
            if !rundcpf(&mut case, &solver)? {
                return Err(format_err!("DC power flow did not succeed"));
            }
            case
        }
        Commands::DcOpf(args) | Commands::AcOpf(args) => {
            let kind = match &cli.command {
                Commands::AcOpf(_) => Solver::Ac,
                _ => Solver::Dc,
            };
            let mut case = load_case(&args.case)?;

            let mut ipm = IpmOptBuilder::default();
            ipm.step_control(args.step_control);
            if let Some(max_it) = args.max_it {
                ipm.max_it(max_it);
            }
            let opt = OpfOptBuilder::default()
                .ipm(ipm.build()?)
                .flow_lim(args.flow_lim)
                .ignore_ang_lim(!args.ang_lim)
                .use_pwl(args.use_pwl)
                .build()?;

            let result = solve(&mut case, kind, &opt, &solver)?;
            if !result.converged {
                return Err(format_err!("{:?} OPF did not converge ({:?})", kind, result.status));
            }
            println!("Objective function value: {:.2} $/hr\n", result.f);
            case
        }
    };

    println!("{}", CaseReport::new(&case));

    Ok(())
}
