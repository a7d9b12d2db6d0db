// src/arbitrage/routing/splitter.rs
//! Divides a trade across several routes by water-filling.
//!
//! Starting from an even split over the best routes, an increment is moved
//! from the allocation with the worst marginal return to the one with the
//! best, re-pricing both, for as long as the aggregate objective improves.
//! The increment halves whenever no move helps.

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::evaluator::{Route, RouteEvaluator};
use super::graph::RoutingGraph;
use super::pathfinder::Path;
use crate::config::Config;
use crate::error::{Result, RoutingError};

/// Amounts at or below `total * DUST_FRACTION` are treated as zero
const DUST_FRACTION: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OptimizationGoal {
    #[default]
    MaximizeOutput,
    /// Output discounted by each route's total price impact
    MinimizeImpact,
    /// Output discounted by each route's total fee
    MinimizeFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitterConfig {
    pub max_splits: usize,
    /// Initial increment as a fraction of the total
    pub step_fraction: f64,
    /// Optimization stops once the increment falls below this fraction
    pub min_step_fraction: f64,
    pub max_iterations: usize,
    pub goal: OptimizationGoal,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_splits: 4,
            step_fraction: 0.01,
            min_step_fraction: 0.0005,
            max_iterations: 200,
            goal: OptimizationGoal::MaximizeOutput,
        }
    }
}

impl SplitterConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_splits: config.max_routes,
            max_iterations: config.split_max_iterations,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAllocation {
    /// The route priced at exactly `amount`
    pub route: Route,
    pub fraction: f64,
    pub amount: f64,
    pub expected_output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub id: Uuid,
    pub total_amount: f64,
    pub allocations: Vec<SplitAllocation>,
    pub total_expected_output: f64,
    /// Percent gained over sending everything down the best single route
    pub improvement_over_single_pct: f64,
    pub iterations: usize,
}

impl SplitPlan {
    pub fn is_split(&self) -> bool {
        self.allocations.len() > 1
    }
}

#[derive(Debug, Clone)]
struct Slot {
    path: Path,
    amount: f64,
    route: Option<Route>,
    score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RouteSplitter {
    config: SplitterConfig,
    evaluator: RouteEvaluator,
}

impl RouteSplitter {
    pub fn new(config: SplitterConfig, evaluator: RouteEvaluator) -> Self {
        Self { config, evaluator }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    fn score(&self, route: &Route) -> f64 {
        match self.config.goal {
            OptimizationGoal::MaximizeOutput => route.expected_output,
            OptimizationGoal::MinimizeImpact => {
                route.expected_output * (1.0 - route.total_price_impact_pct / 100.0)
            }
            OptimizationGoal::MinimizeFees => {
                route.expected_output * (1.0 - route.total_fee_pct / 100.0)
            }
        }
    }

    /// Prices `path` at `amount`; empty allocations contribute nothing
    fn value_at(&self, graph: &RoutingGraph, path: &Path, amount: f64, dust: f64) -> (Option<Route>, f64) {
        if amount <= dust {
            return (None, 0.0);
        }
        match self.evaluator.evaluate(graph, path, amount) {
            Some(route) => {
                let score = self.score(&route);
                (Some(route), score)
            }
            None => (None, f64::NEG_INFINITY),
        }
    }

    fn slot(&self, graph: &RoutingGraph, path: &Path, amount: f64, dust: f64) -> Slot {
        let (route, score) = self.value_at(graph, path, amount, dust);
        Slot {
            path: path.clone(),
            amount,
            route,
            score: if score.is_finite() { score } else { 0.0 },
        }
    }

    /// Best routes by expected output, one per distinct path
    fn select_candidates<'a>(&self, routes: &'a [Route]) -> Vec<&'a Route> {
        routes
            .iter()
            .filter(|route| route.expected_output > 0.0)
            .sorted_by(|a, b| {
                b.expected_output
                    .partial_cmp(&a.expected_output)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        b.confidence_score
                            .partial_cmp(&a.confidence_score)
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| a.path.cmp(&b.path))
            })
            .unique_by(|route| route.path.clone())
            .take(self.config.max_splits.max(1))
            .collect()
    }

    /// Splits `total_amount` across `routes`. A single viable route takes
    /// everything; no viable route is `NoRouteFound`.
    pub fn split(&self, graph: &RoutingGraph, routes: &[Route], total_amount: f64) -> Result<SplitPlan> {
        if !total_amount.is_finite() || total_amount <= 0.0 {
            return Err(RoutingError::InvalidAmount(format!(
                "split total must be positive, got {}",
                total_amount
            )));
        }

        let candidates = self.select_candidates(routes);
        if candidates.is_empty() {
            return Err(RoutingError::NoRouteFound(
                "no candidate routes to split across".to_string(),
            ));
        }

        let dust = total_amount * DUST_FRACTION;
        let best_single = candidates
            .iter()
            .filter_map(|route| self.evaluator.evaluate(graph, &route.path, total_amount))
            .max_by(|a, b| {
                self.score(a)
                    .partial_cmp(&self.score(b))
                    .unwrap_or(Ordering::Equal)
            });

        if candidates.len() == 1 {
            let route = best_single.ok_or_else(|| {
                RoutingError::InsufficientLiquidity(format!(
                    "route {} cannot absorb {}",
                    candidates[0].path, total_amount
                ))
            })?;
            return Ok(self.single_plan(route, total_amount, 0));
        }

        let mut slots = self.even_start(graph, &candidates, total_amount, dust);
        if slots.iter().all(|slot| slot.route.is_none()) {
            let route = best_single.ok_or_else(|| {
                RoutingError::InsufficientLiquidity(format!(
                    "no candidate route can absorb {}",
                    total_amount
                ))
            })?;
            return Ok(self.single_plan(route, total_amount, 0));
        }

        let iterations = self.water_fill(graph, &mut slots, total_amount, dust);

        let split_score: f64 = slots.iter().map(|slot| slot.score).sum();
        let single_output = best_single.as_ref().map(|route| route.expected_output);
        if let Some(single) = best_single {
            if self.score(&single) >= split_score {
                debug!("Single route matches or beats the split; not splitting");
                return Ok(self.single_plan(single, total_amount, iterations));
            }
        }

        let Some(plan) = self.build_plan(graph, slots, total_amount, dust, iterations, single_output)
        else {
            return Err(RoutingError::InsufficientLiquidity(
                "split allocation could not be re-priced".to_string(),
            ));
        };

        info!(
            "Split {} across {} routes: output {:.6} ({:+.4}% vs single) after {} iterations",
            total_amount,
            plan.allocations.len(),
            plan.total_expected_output,
            plan.improvement_over_single_pct,
            plan.iterations
        );
        Ok(plan)
    }

    /// Even split; routes that cannot absorb their share hand it to the rest
    fn even_start(&self, graph: &RoutingGraph, candidates: &[&Route], total: f64, dust: f64) -> Vec<Slot> {
        let mut active: Vec<bool> = vec![true; candidates.len()];
        loop {
            let count = active.iter().filter(|&&a| a).count();
            if count == 0 {
                return candidates
                    .iter()
                    .map(|route| self.slot(graph, &route.path, 0.0, dust))
                    .collect();
            }
            let share = total / count as f64;
            let slots: Vec<Slot> = candidates
                .iter()
                .zip(&active)
                .map(|(route, &on)| {
                    let amount = if on { share } else { 0.0 };
                    self.slot(graph, &route.path, amount, dust)
                })
                .collect();

            let mut changed = false;
            for (flag, slot) in active.iter_mut().zip(&slots) {
                if *flag && slot.route.is_none() {
                    *flag = false;
                    changed = true;
                }
            }
            if !changed {
                return slots;
            }
        }
    }

    fn water_fill(&self, graph: &RoutingGraph, slots: &mut [Slot], total: f64, dust: f64) -> usize {
        let mut step = self.config.step_fraction * total;
        let min_step = self.config.min_step_fraction * total;
        let mut iterations = 0;

        while iterations < self.config.max_iterations && step >= min_step && step > dust {
            iterations += 1;

            // best receiver: highest marginal gain per unit
            let mut receiver: Option<(usize, f64)> = None;
            for (j, slot) in slots.iter().enumerate() {
                let (route, score) = self.value_at(graph, &slot.path, slot.amount + step, dust);
                if route.is_none() {
                    continue;
                }
                let gain = (score - slot.score) / step;
                if receiver.map_or(true, |(_, best)| gain > best) {
                    receiver = Some((j, gain));
                }
            }
            let Some((j, _)) = receiver else {
                step /= 2.0;
                continue;
            };

            // worst donor: lowest marginal loss per unit
            let mut donor: Option<(usize, f64, f64, Option<Route>, f64)> = None;
            for (i, slot) in slots.iter().enumerate() {
                if i == j || slot.amount <= dust {
                    continue;
                }
                let delta = step.min(slot.amount);
                let remaining = slot.amount - delta;
                let (route, score) = self.value_at(graph, &slot.path, remaining, dust);
                if remaining > dust && route.is_none() {
                    continue;
                }
                let loss = (slot.score - score) / delta;
                if donor.as_ref().map_or(true, |(_, best, ..)| loss < *best) {
                    donor = Some((i, loss, delta, route, score));
                }
            }
            let Some((i, _, delta, donor_route, donor_score)) = donor else {
                step /= 2.0;
                continue;
            };

            let (receiver_route, receiver_score) =
                self.value_at(graph, &slots[j].path, slots[j].amount + delta, dust);
            if receiver_route.is_none() {
                step /= 2.0;
                continue;
            }

            let before = slots[i].score + slots[j].score;
            let after = donor_score + receiver_score;
            if after <= before + before.abs() * 1e-15 {
                step /= 2.0;
                continue;
            }

            slots[i].amount -= delta;
            if slots[i].amount <= dust {
                slots[i].amount = 0.0;
            }
            slots[i].route = donor_route;
            slots[i].score = donor_score;
            slots[j].amount += delta;
            slots[j].route = receiver_route;
            slots[j].score = receiver_score;
        }

        iterations
    }

    fn build_plan(
        &self,
        graph: &RoutingGraph,
        slots: Vec<Slot>,
        total: f64,
        dust: f64,
        iterations: usize,
        single_output: Option<f64>,
    ) -> Option<SplitPlan> {
        let mut live: Vec<Slot> = slots
            .into_iter()
            .filter(|slot| slot.amount > dust && slot.route.is_some())
            .collect();
        if live.is_empty() {
            return None;
        }

        // last allocation absorbs rounding
        let assigned: f64 = live[..live.len() - 1].iter().map(|slot| slot.amount).sum();
        let last = live.len() - 1;
        let remainder = total - assigned;
        if remainder != live[last].amount {
            let path = live[last].path.clone();
            live[last] = self.slot(graph, &path, remainder, dust);
            live[last].route.as_ref()?;
        }

        let mut fraction_sum = 0.0;
        let count = live.len();
        let allocations: Vec<SplitAllocation> = live
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let route = slot.route?;
                let fraction = if index + 1 == count {
                    1.0 - fraction_sum
                } else {
                    slot.amount / total
                };
                fraction_sum += fraction;
                Some(SplitAllocation {
                    expected_output: route.expected_output,
                    route,
                    fraction,
                    amount: slot.amount,
                })
            })
            .collect();

        let total_expected_output: f64 = allocations.iter().map(|a| a.expected_output).sum();
        Some(SplitPlan {
            id: Uuid::new_v4(),
            total_amount: total,
            allocations,
            total_expected_output,
            improvement_over_single_pct: improvement_pct(total_expected_output, single_output),
            iterations,
        })
    }

    fn single_plan(&self, route: Route, total: f64, iterations: usize) -> SplitPlan {
        let output = route.expected_output;
        SplitPlan {
            id: Uuid::new_v4(),
            total_amount: total,
            allocations: vec![SplitAllocation {
                expected_output: output,
                route,
                fraction: 1.0,
                amount: total,
            }],
            total_expected_output: output,
            improvement_over_single_pct: 0.0,
            iterations,
        }
    }
}

fn improvement_pct(split_output: f64, single_output: Option<f64>) -> f64 {
    match single_output {
        Some(single) if single > 0.0 => (split_output - single) / single * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, core_assets, cp_pool, two_hop_pools};
    use assert_approx_eq::assert_approx_eq;

    fn parallel_graph(second_depth: f64) -> (RoutingGraph, Vec<Path>) {
        let (usdc, sol, token) = core_assets();
        let usdt = asset("USDT", 6);
        let pools = vec![
            cp_pool(&usdc, &sol, 1_000_000.0, 1_000_000.0, 30),
            cp_pool(&sol, &token, 1_000_000.0, 1_000_000.0, 30),
            cp_pool(&usdc, &usdt, second_depth, second_depth, 30),
            cp_pool(&usdt, &token, second_depth, second_depth, 30),
        ];
        let paths = vec![
            Path::new(vec![usdc.mint, sol.mint, token.mint]).unwrap(),
            Path::new(vec![usdc.mint, usdt.mint, token.mint]).unwrap(),
        ];
        (RoutingGraph::build(&pools), paths)
    }

    fn routes_for(graph: &RoutingGraph, paths: &[Path], amount: f64) -> Vec<Route> {
        RouteEvaluator::default().evaluate_all(graph, paths, amount)
    }

    fn assert_plan_sums(plan: &SplitPlan) {
        let amount_sum: f64 = plan.allocations.iter().map(|a| a.amount).sum();
        let fraction_sum: f64 = plan.allocations.iter().map(|a| a.fraction).sum();
        assert_approx_eq!(amount_sum, plan.total_amount, plan.total_amount * 1e-12);
        assert_approx_eq!(fraction_sum, 1.0, 1e-12);
        assert!(plan.allocations.iter().all(|a| a.expected_output > 0.0));
    }

    #[test]
    fn test_symmetric_routes_split_evenly() {
        let (graph, paths) = parallel_graph(1_000_000.0);
        let amount = 200_000.0;
        let routes = routes_for(&graph, &paths, amount);
        let plan = RouteSplitter::default().split(&graph, &routes, amount).unwrap();

        assert_eq!(plan.allocations.len(), 2);
        assert_plan_sums(&plan);
        assert_approx_eq!(plan.allocations[0].fraction, 0.5, 1e-9);
        let single = routes[0].expected_output;
        assert!(plan.total_expected_output > single);
        assert!(plan.improvement_over_single_pct > 0.0);
    }

    #[test]
    fn test_uneven_depth_shifts_allocation() {
        let (graph, paths) = parallel_graph(250_000.0);
        let amount = 100_000.0;
        let routes = routes_for(&graph, &paths, amount);
        let plan = RouteSplitter::default().split(&graph, &routes, amount).unwrap();

        assert_plan_sums(&plan);
        let deep = plan
            .allocations
            .iter()
            .find(|a| a.route.path == paths[0])
            .unwrap();
        assert!(deep.fraction > 0.6);
        let best_single = routes
            .iter()
            .map(|r| r.expected_output)
            .fold(0.0, f64::max);
        assert!(plan.total_expected_output >= best_single);
    }

    #[test]
    fn test_single_route_takes_everything() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, sol, token) = core_assets();
        let path = Path::new(vec![usdc.mint, sol.mint, token.mint]).unwrap();
        let routes = routes_for(&graph, &[path], 5_000.0);

        let plan = RouteSplitter::default().split(&graph, &routes, 5_000.0).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].fraction, 1.0);
        assert_eq!(plan.allocations[0].amount, 5_000.0);
        assert!(!plan.is_split());
    }

    #[test]
    fn test_no_routes_is_no_route_found() {
        let graph = RoutingGraph::build(&two_hop_pools());
        assert!(matches!(
            RouteSplitter::default().split(&graph, &[], 10.0),
            Err(RoutingError::NoRouteFound(_))
        ));
        assert!(matches!(
            RouteSplitter::default().split(&graph, &[], -1.0),
            Err(RoutingError::InvalidAmount(_))
        ));
    }

    fn splitter_for(goal: OptimizationGoal) -> RouteSplitter {
        RouteSplitter::new(
            SplitterConfig {
                goal,
                ..SplitterConfig::default()
            },
            RouteEvaluator::default(),
        )
    }

    fn share_of(plan: &SplitPlan, path: &Path) -> f64 {
        plan.allocations
            .iter()
            .filter(|a| &a.route.path == path)
            .map(|a| a.fraction)
            .sum()
    }

    #[test]
    fn test_fee_goal_shifts_toward_cheap_route() {
        let (usdc, sol, token) = core_assets();
        let usdt = asset("USDT", 6);
        let pools = vec![
            cp_pool(&usdc, &sol, 1_000_000.0, 1_000_000.0, 100),
            cp_pool(&sol, &token, 1_000_000.0, 1_000_000.0, 100),
            cp_pool(&usdc, &usdt, 500_000.0, 500_000.0, 1),
            cp_pool(&usdt, &token, 500_000.0, 500_000.0, 1),
        ];
        let graph = RoutingGraph::build(&pools);
        let cheap = Path::new(vec![usdc.mint, usdt.mint, token.mint]).unwrap();
        let paths = vec![Path::new(vec![usdc.mint, sol.mint, token.mint]).unwrap(), cheap.clone()];
        let amount = 100_000.0;
        let routes = routes_for(&graph, &paths, amount);

        let by_output = splitter_for(OptimizationGoal::MaximizeOutput)
            .split(&graph, &routes, amount)
            .unwrap();
        let by_fees = splitter_for(OptimizationGoal::MinimizeFees)
            .split(&graph, &routes, amount)
            .unwrap();

        assert_plan_sums(&by_output);
        assert_plan_sums(&by_fees);
        assert!(by_output.is_split());
        assert!(share_of(&by_fees, &cheap) > share_of(&by_output, &cheap) + 0.005);
        // output is what MaximizeOutput optimizes
        assert!(by_output.total_expected_output >= by_fees.total_expected_output);
    }

    #[test]
    fn test_impact_goal_allocates_by_depth() {
        let (graph, paths) = parallel_graph(250_000.0);
        let amount = 100_000.0;
        let routes = routes_for(&graph, &paths, amount);
        let plan = splitter_for(OptimizationGoal::MinimizeImpact)
            .split(&graph, &routes, amount)
            .unwrap();

        assert_plan_sums(&plan);
        assert!(plan.is_split());
        let deep = share_of(&plan, &paths[0]);
        assert!(deep > 0.7 && deep < 0.9, "deep share {}", deep);
        let impacts: Vec<f64> = plan
            .allocations
            .iter()
            .map(|a| a.route.total_price_impact_pct)
            .collect();
        let (lo, hi) = impacts
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        assert!(hi - lo < hi * 0.25);
    }

    #[test]
    fn test_duplicate_paths_counted_once() {
        let (graph, paths) = parallel_graph(1_000_000.0);
        let mut routes = routes_for(&graph, &paths[..1], 10_000.0);
        routes.push(routes[0].clone());
        let plan = RouteSplitter::default().split(&graph, &routes, 10_000.0).unwrap();
        assert_eq!(plan.allocations.len(), 1);
    }
}
