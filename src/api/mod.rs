use rocket::Route;

mod face;
mod nomination;
mod results;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(face::routes());
    routes.extend(voting::routes());
    routes.extend(nomination::routes());
    routes.extend(results::routes());
    routes
}
