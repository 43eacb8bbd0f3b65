use anyhow::Result;

use diary_core::assistant::{
    GenerativeProvider, Goal, Plan, PlanDuration, calorie_target_range, generate_plan,
};
use diary_core::diets;
use diary_core::service::Diary;

use super::helpers::json_error;

pub(crate) async fn cmd_plan(
    diary: &Diary,
    ai: &dyn GenerativeProvider,
    goal: Goal,
    duration: PlanDuration,
    json: bool,
) -> Result<()> {
    let request = diary.plan_request(goal, duration);
    let range = calorie_target_range(goal, request.tdee);
    if !json {
        eprintln!(
            "Generating a {} {} plan (BMR {:.0}, TDEE {:.0}, target {:.0}-{:.0} kcal/day)...",
            duration.label(),
            goal.label(),
            request.bmr,
            request.tdee,
            range.low,
            range.high
        );
    }

    match generate_plan(ai, &request).await {
        Ok(plan) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
        Err(e) => {
            tracing::warn!("plan generation failed: {e}");
            let message = format!("無法生成計畫：{}", e.user_message());
            if json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
        }
    }

    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.condensed {
        println!(
            "({} 天的循環計畫，請重複執行至一個月)\n",
            plan.days.len()
        );
    }
    for day in &plan.days {
        println!("== {} ==", day.day);
        for meal in &day.meals {
            println!("  {}: {}", meal.meal_type, meal.food_items.join("、"));
            if let Some(notes) = meal.recipe_notes.as_deref().filter(|n| !n.is_empty()) {
                println!("    {notes}");
            }
        }
        for exercise in &day.exercises {
            match exercise.intensity.as_deref().filter(|i| !i.is_empty()) {
                Some(intensity) => println!(
                    "  運動: {} {} ({intensity})",
                    exercise.exercise_type, exercise.duration
                ),
                None => println!("  運動: {} {}", exercise.exercise_type, exercise.duration),
            }
        }
        println!();
    }
}

pub(crate) fn cmd_diets(name: Option<&str>, json: bool) -> Result<()> {
    let Some(name) = name else {
        let plans = diets::all();
        if json {
            println!("{}", serde_json::to_string_pretty(&plans)?);
        } else {
            for p in &plans {
                println!("{}: {}", p.name, p.description);
            }
        }
        return Ok(());
    };

    match diets::find(name) {
        Some(plan) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("{}\n", plan.name);
                println!("{}\n", plan.description);
                println!("適合族群: {}", plan.audience);
                println!("執行方式: {}", plan.how_to);
                println!("優點:     {}", plan.pros);
                println!("缺點:     {}", plan.cons);
                println!("建議:     {}", plan.advice);
            }
        }
        None => {
            if json {
                println!("{}", json_error(&format!("No diet plan named '{name}'")));
            } else {
                eprintln!("No diet plan named '{name}'. Run `diary diets` to list them.");
            }
        }
    }

    Ok(())
}
