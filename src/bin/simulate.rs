use chess_arena::enums::{Color, PieceKind};
use chess_arena::events::EventFeed;
use chess_arena::observers::moves_log::MOVE_LOG_EVENTS;
use chess_arena::observers::score::SCORE_EVENTS;
use chess_arena::observers::{MoveLog, ScoreBoard};
use chess_arena::pieces::PieceId;
use chess_arena::rules::legal_targets;
use chess_arena::{Cell, GameSession};
use clap::{Parser, ValueEnum};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Uniformly random legal move
    Random,
    /// Most valuable capture when one exists, otherwise random
    Greedy,
}

/// Plays headless random matches against the real session rules.
#[derive(Parser, Debug)]
#[command(name = "simulate")]
struct Args {
    #[arg(short = 'n', long = "num-games", default_value_t = 100)]
    num_games: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 400)]
    max_plies: u32,

    #[arg(long, value_enum, default_value_t = Strategy::Random)]
    white: Strategy,

    #[arg(long, value_enum, default_value_t = Strategy::Random)]
    black: Strategy,

    #[arg(short, long)]
    verbose: bool,
}

struct MatchResult {
    winner: Option<Color>,
    plies: u32,
    captures: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("♟️ Chess Arena Simulation");
    println!("=========================");
    println!("Configuration:");
    println!("  - Games: {}", args.num_games);
    println!("  - Seed: {}", args.seed);
    println!("  - White: {:?}, Black: {:?}", args.white, args.black);
    println!("  - Max plies: {}", args.max_plies);

    let log_mismatches = AtomicUsize::new(0);
    let results: Vec<MatchResult> = (0..args.num_games)
        .into_par_iter()
        .map(|game| simulate_single_game(&args, game, &log_mismatches))
        .collect();

    let white_wins = results.iter().filter(|r| r.winner == Some(Color::White)).count();
    let black_wins = results.iter().filter(|r| r.winner == Some(Color::Black)).count();
    let unfinished = results.len() - white_wins - black_wins;
    let total = results.len().max(1) as f64;
    let avg_plies = results.iter().map(|r| r.plies as f64).sum::<f64>() / total;
    let avg_captures = results.iter().map(|r| r.captures as f64).sum::<f64>() / total;

    println!("\n📊 Results:");
    println!("===========");
    println!("White: {} wins ({:.1}%)", white_wins, white_wins as f64 / total * 100.0);
    println!("Black: {} wins ({:.1}%)", black_wins, black_wins as f64 / total * 100.0);
    println!("Unfinished: {}", unfinished);
    println!("Average plies per game: {:.1}", avg_plies);
    println!("Average captures per game: {:.1}", avg_captures);
    let failures = log_mismatches.load(Ordering::Relaxed);
    if failures > 0 {
        println!("⚠️ Games whose move log disagrees with the ply count: {}", failures);
    }
}

fn simulate_single_game(args: &Args, game: usize, log_mismatches: &AtomicUsize) -> MatchResult {
    let match_id = format!("sim_{}", game);
    let feed = Arc::new(EventFeed::new());
    let scores = Arc::new(ScoreBoard::new());
    let moves = Arc::new(MoveLog::new());
    feed.subscribe(&SCORE_EVENTS, scores.clone());
    feed.subscribe(&MOVE_LOG_EVENTS, moves.clone());

    let mut rng = XorShiftRng::seed_from_u64(args.seed.wrapping_add(game as u64));
    let mut session = GameSession::new(match_id.clone(), feed.clone());
    session.start();

    let mut plies = 0;
    while plies < args.max_plies && !session.is_over() {
        let turn = session.turn();
        let strategy = match turn {
            Color::White => args.white,
            Color::Black => args.black,
        };
        let Some((piece, target)) = choose_move(&session, strategy, &mut rng) else {
            break;
        };
        match session.attempt_move(turn, &piece, target) {
            Ok(outcome) => {
                if args.verbose {
                    println!(
                        "  [{}] {} {} {} -> {}{}",
                        match_id,
                        turn,
                        piece,
                        outcome.from,
                        outcome.to,
                        if outcome.captured.is_some() { " x" } else { "" }
                    );
                }
            }
            Err(e) => {
                log::error!("Generated move rejected in {}: {}", match_id, e);
                break;
            }
        }
        plies += 1;
    }

    let logged = moves.records(&match_id).map(|r| r.len()).unwrap_or(0);
    if logged != plies as usize {
        log_mismatches.fetch_add(1, Ordering::Relaxed);
    }
    let captures = scores
        .summary(&match_id)
        .map(|s| s.captures_white + s.captures_black)
        .unwrap_or(0);

    if args.verbose {
        match session.winner() {
            Some(winner) => println!("🎉 {} won by {} in {} plies", match_id, winner, plies),
            None => println!("⏱️ {} unfinished after {} plies", match_id, plies),
        }
    }
    session.close();

    MatchResult {
        winner: session.winner(),
        plies,
        captures,
    }
}

fn choose_move(session: &GameSession, strategy: Strategy, rng: &mut XorShiftRng) -> Option<(PieceId, Cell)> {
    let pieces = session.pieces();
    let candidates: Vec<(PieceId, Cell, u32)> = pieces
        .of_color(session.turn())
        .flat_map(|piece| {
            legal_targets(piece, pieces).into_iter().map(move |cell| {
                let value = pieces
                    .piece_at(cell)
                    .map(|target| match target.kind() {
                        PieceKind::King => 100,
                        kind => kind.value() + 1,
                    })
                    .unwrap_or(0);
                (piece.id().clone(), cell, value)
            })
        })
        .collect();

    let chosen = match strategy {
        Strategy::Greedy => {
            let best = candidates.iter().map(|c| c.2).max().unwrap_or(0);
            let top: Vec<_> = candidates.iter().filter(|c| c.2 == best).collect();
            top.choose(rng).map(|c| (*c).clone())
        }
        Strategy::Random => candidates.choose(rng).cloned(),
    };
    chosen.map(|(piece, cell, _)| (piece, cell))
}
